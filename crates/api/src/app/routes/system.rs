use axum::{Json, http::StatusCode, response::Response};
use serde_json::{Value, json};

use crate::app::errors::json_error;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Fallback for undeclared routes (reached only after authentication).
pub async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "no such route")
}
