//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, identity provider and authorization services
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `cookies.rs`: session cookie policy
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};

use crate::config::ApiConfig;
use crate::middleware;

pub mod cookies;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Router over already-built services.
///
/// The authorization middleware wraps every route, the fallback included, so
/// an undeclared path is still authenticated before it can 404.
pub fn router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        routes: services.routes.clone(),
        verifier: services.sessions.verifier().clone(),
        gate: services.sessions.gate().clone(),
        trust_forwarded_for: services.trust_forwarded_for,
    };

    Router::new()
        .nest("/api", routes::router())
        .fallback(routes::system::not_found)
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ))
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(router(services))
}

pub use services::AppServices;
