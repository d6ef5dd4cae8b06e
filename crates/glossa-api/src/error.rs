//! HTTP error mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};

use glossa_core::Error;

/// Error returned by handlers; renders as `{"error": msg}`.
#[derive(Debug)]
pub enum ApiError {
    Internal(Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::ItemNotFound(_) => ApiError::NotFound(err.to_string()),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::OwnershipLost { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                tracing::error!(
                    subsystem = "api",
                    error = %err,
                    "Request failed"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
