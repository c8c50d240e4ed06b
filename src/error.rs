//! Error types for Borrowdesk server

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::borrow::BorrowStatus;

/// Numeric error codes exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    ActiveBorrowExists = 10,
    CooldownActive = 11,
    NoCopiesAvailable = 12,
    RecordNotPending = 13,
    UserAlreadyBorrowing = 14,
    NoActiveBorrow = 15,
}

/// Coarse classification of every error, independent of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Server,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User already has an active borrow ({status})")]
    ActiveBorrowExists { status: BorrowStatus },

    #[error("Book was rejected recently, retry allowed after {retry_after}")]
    CooldownActive {
        remaining_seconds: i64,
        retry_after: DateTime<Utc>,
    },

    #[error("No copies available for book {book_id}")]
    NoCopiesAvailable { book_id: i32 },

    #[error("Borrow record is not pending (current status: {status})")]
    RecordNotPending { status: BorrowStatus },

    #[error("User already holds a borrowed book")]
    UserAlreadyBorrowing,

    #[error("No active borrow for user {user_id} and book {book_id}")]
    NoActiveBorrow { user_id: i32, book_id: i32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Authentication(_) => ErrorKind::Unauthenticated,
            AppError::Authorization(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::ActiveBorrowExists { .. }
            | AppError::CooldownActive { .. }
            | AppError::NoCopiesAvailable { .. }
            | AppError::RecordNotPending { .. }
            | AppError::UserAlreadyBorrowing
            | AppError::NoActiveBorrow { .. } => ErrorKind::Conflict,
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::Server,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) | AppError::Authorization(_) => ErrorCode::NotAuthorized,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::ActiveBorrowExists { .. } => ErrorCode::ActiveBorrowExists,
            AppError::CooldownActive { .. } => ErrorCode::CooldownActive,
            AppError::NoCopiesAvailable { .. } => ErrorCode::NoCopiesAvailable,
            AppError::RecordNotPending { .. } => ErrorCode::RecordNotPending,
            AppError::UserAlreadyBorrowing => ErrorCode::UserAlreadyBorrowing,
            AppError::NoActiveBorrow { .. } => ErrorCode::NoActiveBorrow,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Machine-readable context for conflicts the caller can act on
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ActiveBorrowExists { status } => Some(json!({ "status": status })),
            AppError::RecordNotPending { status } => Some(json!({ "status": status })),
            AppError::CooldownActive {
                remaining_seconds,
                retry_after,
            } => Some(json!({
                "remainingSeconds": remaining_seconds,
                "retryAfter": retry_after,
            })),
            AppError::NoCopiesAvailable { book_id } => Some(json!({ "bookId": book_id })),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::CooldownActive {
                remaining_seconds, ..
            } => {
                let total_minutes = (remaining_seconds + 59) / 60;
                let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
                format!(
                    "Your last request for this book was rejected. You can request it again in {}h {}m",
                    hours, minutes
                )
            }
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg) => msg.clone(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            _ => {}
        }

        let code = self.code();
        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message: self.message(),
            details: self.details(),
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

// Extractor failures answer with the same body as every other bad request

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
