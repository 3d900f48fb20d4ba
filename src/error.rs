// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// Sign-in or sign-out failed (shown to the user as a dismissible message).
    #[error("Sign-in failed: {0}")]
    Auth(String),

    #[error("Unauthorized domain: {0}")]
    UnauthorizedDomain(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Optimistic revision check failed.
    #[error("Revision conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// The store rejected a create/update/delete.
    #[error("Write rejected: {0}")]
    Write(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A live feed fell behind or disconnected; data may be stale.
    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    /// Machine-readable error code used in responses and SSE events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidToken => "invalid_token",
            AppError::Auth(_) => "auth_error",
            AppError::UnauthorizedDomain(_) => "unauthorized_domain",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict { .. } => "conflict",
            AppError::Write(_) => "write_failed",
            AppError::Database(_) => "database_error",
            AppError::Subscription(_) => "stale",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized
            | AppError::InvalidToken
            | AppError::Auth(_)
            | AppError::UnauthorizedDomain(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Write(_) | AppError::Subscription(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::Unauthorized | AppError::InvalidToken => None,
            AppError::Auth(msg) | AppError::UnauthorizedDomain(msg) => {
                tracing::warn!(error = %msg, "Sign-in rejected");
                Some(msg.clone())
            }
            AppError::Forbidden(msg) | AppError::NotFound(msg) | AppError::BadRequest(msg) => {
                Some(msg.clone())
            }
            AppError::Conflict { expected, actual } => {
                tracing::warn!(expected, actual, "Stale revision rejected");
                Some(self.to_string())
            }
            AppError::Write(msg) => {
                // No compensating action; the client keeps its optimistic state.
                tracing::error!(error = %msg, "Write rejected by store");
                Some(msg.clone())
            }
            AppError::Subscription(msg) => {
                tracing::warn!(error = %msg, "Subscription error");
                Some(msg.clone())
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
