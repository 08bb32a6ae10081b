use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// Invalid window or budget, or an unusable deployment setting.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The counting store was unreachable, timed out, or answered with an
    /// unexpected shape. The request outcome is indeterminate.
    #[error("Store error: {0}")]
    Store(String),

    /// A histogram field or count for `key` is not an integer.
    #[error("Data corruption in '{key}': {detail}")]
    DataCorruption { key: String, detail: String },
}

impl ThrottlerError {
    /// Short machine-readable category, used for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            ThrottlerError::Configuration(_) => "configuration",
            ThrottlerError::Store(_) => "store",
            ThrottlerError::DataCorruption { .. } => "data_corruption",
        }
    }
}

impl From<redis::RedisError> for ThrottlerError {
    fn from(err: redis::RedisError) -> Self {
        ThrottlerError::Store(err.to_string())
    }
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
            retry_after: None,
        }
    }

    pub fn rate_limited(wait_seconds: u64) -> Self {
        Self {
            retry_after: Some(wait_seconds),
            ..Self::new(
                "rate_limit_exceeded",
                &format!("Rate limit exceeded. Try again in {} seconds", wait_seconds),
                StatusCode::TOO_MANY_REQUESTS.as_u16(),
            )
        }
    }

    /// Generic body for failures; never carries store or key details.
    pub fn internal() -> Self {
        Self::new(
            "internal_error",
            "Internal server error",
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        )
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
    }
}
