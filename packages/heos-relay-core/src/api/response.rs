//! HTTP response helper functions for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// Plain-text acknowledgement sent once a command has been dispatched.
pub fn command_ok() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Plain-text 404 for unknown paths.
pub fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "NOT FOUND")
}
