//! Error types for the loan desk server

use std::fmt;

use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{CopyId, LoanId, MemberId, TitleId};

/// Numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchMember = 4,
    NoSuchTitle = 5,
    NoCopyAvailable = 7,
    NoSuchCopy = 13,
    BadValue = 18,
    NoSuchLoan = 20,
    AlreadyReturned = 22,
    StoreBusy = 23,
}

/// The record a `NotFound` error refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Title(String),
    Copy(CopyId),
    Loan(LoanId),
    Member(MemberId),
}

impl Resource {
    fn code(&self) -> ErrorCode {
        match self {
            Resource::Title(_) => ErrorCode::NoSuchTitle,
            Resource::Copy(_) => ErrorCode::NoSuchCopy,
            Resource::Loan(_) => ErrorCode::NoSuchLoan,
            Resource::Member(_) => ErrorCode::NoSuchMember,
        }
    }

    fn id(&self) -> String {
        match self {
            Resource::Title(t) => t.clone(),
            Resource::Copy(id) => id.to_string(),
            Resource::Loan(id) => id.to_string(),
            Resource::Member(id) => id.to_string(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Title(t) => write!(f, "title {}", t),
            Resource::Copy(id) => write!(f, "copy {}", id),
            Resource::Loan(id) => write!(f, "loan {}", id),
            Resource::Member(id) => write!(f, "member {}", id),
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(Resource),

    #[error("No copy available for title {0}")]
    NoCopyAvailable(TitleId),

    #[error("Loan {0} already returned")]
    AlreadyReturned(LoanId),

    #[error("Store temporarily unavailable: {0}")]
    Transient(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the same request after a short delay
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Transient(err.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // lock_not_available, deadlock_detected, serialization_failure, query_canceled
                Some("55P03") | Some("40P01") | Some("40001") | Some("57014") => {
                    AppError::Transient(db_err.message().to_string())
                }
                _ => AppError::Database(err),
            },
            _ => AppError::Database(err),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// Identifier of the affected record, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, id) = match &self {
            AppError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, resource.code(), Some(resource.id()))
            }
            AppError::NoCopyAvailable(title_id) => (
                StatusCode::CONFLICT,
                ErrorCode::NoCopyAvailable,
                Some(title_id.to_string()),
            ),
            AppError::AlreadyReturned(loan_id) => (
                StatusCode::CONFLICT,
                ErrorCode::AlreadyReturned,
                Some(loan_id.to_string()),
            ),
            AppError::Transient(msg) => {
                tracing::warn!("Transient store failure: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreBusy, None)
            }
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure, None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure, None)
            }
        };

        // Do not leak driver details to clients
        let message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            _ => message,
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            id,
        });

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [(RETRY_AFTER, "1")], body).into_response();
        }
        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
