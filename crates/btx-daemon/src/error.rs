//! Maps every error this daemon can produce onto §7's error kinds, as one
//! explicit enum→status mapping rather than string-sniffing a message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    /// 400 — bad input, constraint breach, sandbox rejection.
    Validation(String),
    /// 401 — missing or invalid bearer token.
    Unauthorized,
    /// 404 — unknown strategy/run/symbol.
    NotFound(String),
    /// 429 — rate limit breach.
    RateLimited,
    /// 5xx — unexpected failure, already logged with context at the call site.
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ApiError::NotFound(msg.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid or missing token".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded. try again later.".to_string()),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
