//! Centralized error types for the relay core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::heos::HeosError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for HeosError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "upstream_io_error",
            Self::Decode(_) => "upstream_decode_error",
            Self::Framing(_) => "upstream_framing_error",
            Self::ConnectionClosed => "upstream_connection_closed",
            Self::Unavailable(_) => "upstream_unavailable",
            Self::ConnectTimeout(_) => "upstream_connect_timeout",
            Self::NoDevices(_) => "no_heos_devices",
        }
    }
}

/// Application-wide error type for the relay server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RelayError {
    /// The upstream control connection could not be established.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Writing to the upstream connection failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The concurrent stream session ceiling was reached.
    #[error("Too many stream sessions (limit {0})")]
    TooManySessions(usize),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for RelayError {
    fn code(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Upstream(_) => "upstream_error",
            Self::TooManySessions(_) => "too_many_sessions",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl RelayError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamUnavailable(_) | Self::TooManySessions(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<HeosError> for RelayError {
    fn from(err: HeosError) -> Self {
        match err {
            HeosError::ConnectionClosed => Self::UpstreamUnavailable(err.to_string()),
            HeosError::Unavailable(reason) => Self::UpstreamUnavailable(reason),
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_sessions_is_service_unavailable() {
        let err = RelayError::TooManySessions(500);
        assert_eq!(err.code(), "too_many_sessions");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn closed_connection_maps_to_unavailable() {
        let err: RelayError = HeosError::ConnectionClosed.into();
        assert_eq!(err.code(), "upstream_unavailable");
        assert_eq!(HeosError::NoDevices(3000).code(), "no_heos_devices");
    }

    #[test]
    fn write_failure_is_bad_gateway() {
        let err: RelayError = HeosError::Framing("line too long".into()).into();
        assert!(matches!(err, RelayError::Upstream(_)));
        assert_eq!(err.code(), "upstream_error");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = RelayError::Configuration("max_sessions must be >= 1".into());
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
