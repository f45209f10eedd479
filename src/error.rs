use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::billing::BillingError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
    /// A transaction lost a serialization race. Safe to retry the whole
    /// unit of work once.
    #[error("{0}")]
    ConcurrentModification(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<BillingError> for AppError {
    fn from(error: BillingError) -> Self {
        match error {
            BillingError::InvalidAgreement(_) | BillingError::InvalidAmount(_) => {
                Self::BadRequest(error.to_string())
            }
            BillingError::GenerationLimitExceeded(_) | BillingError::UnknownValue { .. } => {
                Self::Internal(error.to_string())
            }
        }
    }
}

/// Map a sqlx error onto the API taxonomy. Postgres SQLSTATEs:
/// 23505 unique violation, 40001 serialization failure, 40P01 deadlock.
pub fn map_db_error(error: sqlx::Error) -> AppError {
    if let sqlx::Error::RowNotFound = error {
        return AppError::NotFound("Record not found.".to_string());
    }

    let code = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .map(|code| code.into_owned());
    tracing::error!(db_error = %error, sqlstate = ?code, "Database query failed");

    match code.as_deref() {
        Some("23505") => {
            AppError::Conflict("Duplicate value violates a unique constraint.".to_string())
        }
        Some("40001") | Some("40P01") => AppError::ConcurrentModification(
            "The records changed while this request was being processed.".to_string(),
        ),
        _ => AppError::Dependency("Database operation failed.".to_string()),
    }
}
