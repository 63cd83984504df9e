use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::engine::EngineError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    TooManyRequests,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.".to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            // Expected outcome, not a fault: surfaced as 409 with the
            // customer-facing message and fallback contact suggestion.
            EngineError::NoCapacity => {
                ApiError::Conflict(super::public::FULLY_BOOKED_MESSAGE.to_string())
            }
            EngineError::NotFound(id) => ApiError::NotFound(format!("not found: {id}")),
            EngineError::AlreadyExists(_)
            | EngineError::AlreadyAssigned(_)
            | EngineError::Conflict { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::NotSchedulable(_) => ApiError::Conflict(err.to_string()),
            EngineError::InvalidInput(_) | EngineError::LimitExceeded(_) => {
                ApiError::BadRequest(err.to_string())
            }
            EngineError::WalError(e) => ApiError::Internal(e),
        }
    }
}
