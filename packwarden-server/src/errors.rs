//! The axum `IntoResponse` boundary type. Service-layer code returns
//! [`packwarden_core::CoreError`]; this is where error kinds become status
//! codes, in one place, per spec.md §7.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use packwarden_core::CoreError;
use serde_json::json;
use std::fmt;
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.message }));
        (self.status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => Self::not_found(msg),
            CoreError::AlreadyExists(msg) => Self::conflict(msg),
            CoreError::Conflict(msg) => Self::conflict(msg),
            CoreError::Invalid(msg) => Self::bad_request(msg),
            CoreError::Upstream(msg) => {
                error!(error = %msg, "upstream failure");
                Self::new(StatusCode::BAD_GATEWAY, "upstream service unavailable")
            }
            CoreError::Internal(msg) => {
                error!(error = %msg, "internal error");
                Self::internal("internal server error")
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::from(err).into()
    }
}
