use axum::{
    Router,
    routing::{get, post},
};

pub mod admin;
pub mod auth;
pub mod roles;
pub mod system;
pub mod users;

/// Router for every `/api` endpoint. Protection is decided by the route table
/// in the authorization middleware, not by where a route is mounted here.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/auth", auth::router())
        .route("/user", get(users::own_profile))
        .route("/users", get(users::list))
        .route("/users/roles", post(roles::assign).delete(roles::remove))
        .route("/users/approve", post(roles::decide_approval))
        .route("/users/:uid", get(users::get_one).put(users::update))
        .nest("/admin", admin::router())
}
