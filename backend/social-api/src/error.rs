/// Error types for social-api
///
/// Every failure that reaches a handler is an `AppError`. Each variant carries
/// a machine-readable kind and renders as
/// `{ "success": false, "error": kind, "message": text, "status": code }`.
use crate::db::StoreError;
use crate::services::auth::AuthError;
use crate::services::media::UploadError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Result type for social-api operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced user, post or target does not exist
    #[error("{0}")]
    NotFound(String),

    /// Invalid state transition (self-follow, double-follow, duplicate account)
    #[error("{0}")]
    Conflict(String),

    /// Missing or invalid credential
    #[error("{0}")]
    Unauthorized(String),

    /// Media host rejected or errored
    #[error("{0}")]
    UploadFailed(String),

    /// Malformed request payload
    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::UploadFailed(_) => "upload_failed",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Internal details stay in the logs.
        let message = match self {
            AppError::Database(msg) | AppError::Internal(msg) => {
                tracing::error!(kind = self.kind(), "request failed: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(serde_json::json!({
            "success": false,
            "error": self.kind(),
            "message": message,
            "status": status.as_u16(),
        }))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e.to_string()),
            StoreError::Duplicate(what) => AppError::Conflict(format!("{what} is already taken")),
            StoreError::EdgeExists => AppError::Conflict("Already following this user".to_string()),
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(e) => e.into(),
            AuthError::Signing(msg) => AppError::Internal(msg),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Rejected(msg) => AppError::ValidationFailed(msg),
            other => AppError::UploadFailed(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{field} {reason}")
            })
            .collect();
        fields.sort();
        AppError::ValidationFailed(fields.join("; "))
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::ValidationFailed(format!("Malformed multipart body: {err}"))
    }
}
