use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid_credentials")]
    InvalidCredentials,

    #[error("too_many_attempts")]
    TooManyAttempts { retry_after_seconds: u64 },

    #[error("internal_error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "ok": false, "error": "unauthorized" })),
            )
                .into_response(),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "ok": false, "error": "invalid_credentials" })),
            )
                .into_response(),
            ApiError::TooManyAttempts {
                retry_after_seconds,
            } => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                    headers.insert("Retry-After", value);
                }
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    headers,
                    Json(json!({ "ok": false, "error": "too_many_attempts" })),
                )
                    .into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false, "error": "internal_error" })),
                )
                    .into_response()
            }
        }
    }
}
