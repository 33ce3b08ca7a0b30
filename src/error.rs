// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Application-level error, mapped to an HTTP status by `IntoResponse`.
#[derive(Debug)]
pub enum AppError {
    /// Malformed or out-of-range input. Never partially applied.
    BadRequest(String),
    /// Missing or invalid credentials.
    AuthError(String),
    /// Authenticated, but the role does not permit the operation.
    Forbidden(String),
    /// Referenced entity absent, or an empty question pool.
    NotFound(String),
    /// Duplicate names and taxonomy deletion guards.
    Conflict(String),
    /// Store failures and result-invariant violations. The detail is
    /// logged; callers only see a generic message.
    InternalServerError(String),
}

impl AppError {
    /// Maps a unique-constraint violation to `Conflict`; any other
    /// database error stays internal.
    pub fn unique_violation(err: sqlx::Error, conflict_message: String) -> Self {
        let text = err.to_string();
        if text.contains("unique constraint") || text.contains("23505") {
            AppError::Conflict(conflict_message)
        } else {
            tracing::error!("Database write failed: {:?}", err);
            AppError::InternalServerError(text)
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InternalServerError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Lets `?` promote query failures on paths without a more specific
/// mapping.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}
