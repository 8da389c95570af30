use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::storage::StorageError;

/// Every handler returns [`AppResult`]. The variant picks the HTTP status and
/// the `code` of the JSON envelope
/// `{"error": {"code", "message", "details"?}, "status", "timestamp"}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Foreign key or unique constraint, or an author that still has books.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Raw driver text; logged, never sent to the client.
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// An uploaded file or the whole body is over its limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Rate limited. Retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },
    #[error("Validation error on field '{field}': {message}")]
    ValidationError { field: String, message: String },
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidInput(_) | AppError::ValidationError { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Database(_) | AppError::IoError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::IoError(_) => "IO_ERROR",
        }
    }

    /// Client-facing message and optional details. Server-side failures are
    /// logged under a fresh error id and only the id is returned.
    fn public_parts(self) -> (String, Option<Value>) {
        let generic = match &self {
            AppError::Internal(_) => Some("An internal server error occurred"),
            AppError::Database(_) => Some("A database error occurred"),
            AppError::IoError(_) => Some("An I/O error occurred"),
            _ => None,
        };
        if let Some(generic) = generic {
            let error_id = uuid::Uuid::new_v4().to_string();
            match &self {
                AppError::Internal(e) => tracing::error!(%error_id, "Internal error: {:?}", e),
                other => tracing::error!(%error_id, "{}", other),
            }
            return (generic.to_string(), Some(json!({ "error_id": error_id })));
        }

        match self {
            AppError::RateLimited { retry_after_seconds } => (
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            AppError::ValidationError { field, message } => (
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::InvalidInput(msg)
            | AppError::PayloadTooLarge(msg) => (msg, None),
            AppError::Internal(_) | AppError::Database(_) | AppError::IoError(_) => (String::new(), None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = self.public_parts();

        let mut error = json!({ "code": code, "message": message });
        if let Some(details) = details {
            error["details"] = details;
        }
        let body = json!({
            "error": error,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_foreign_key_violation() {
                    AppError::Conflict("Referenced record does not exist or is still in use".to_string())
                } else if db_err.is_unique_violation() {
                    AppError::Conflict("A record with the same unique value already exists".to_string())
                } else {
                    AppError::Database(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("{}: {}", err.kind(), err))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::BadRequest(format!("Malformed multipart body: {}", err.body_text()))
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(path) => AppError::ValidationError {
                field: "path".to_string(),
                message: format!("Not an upload path: {}", path),
            },
            StorageError::Io(e) => AppError::from(e),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Lookup helper for `fetch_optional` results.
pub trait OptionExt<T> {
    /// Converts `None` into `AppError::NotFound("<entity> not found")`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Helpers shared by handlers for turning raw request input into typed values.
pub mod validation {
    use super::*;
    use crate::types::{PageParams, PageQuery};

    /// Parses a path segment id; anything but an integer is `"Invalid <entity> ID"`.
    pub fn parse_id(raw: &str, entity: &str) -> AppResult<i64> {
        raw.trim()
            .parse::<i64>()
            .map_err(|_| AppError::BadRequest(format!("Invalid {} ID", entity)))
    }

    /// `None` passes; `Some` must be above zero.
    pub fn validate_positive_number(value: Option<i64>, field: &str) -> AppResult<()> {
        if let Some(v) = value {
            if v <= 0 {
                return Err(AppError::ValidationError {
                    field: field.to_string(),
                    message: format!("Value must be positive, got {}", v),
                });
            }
        }
        Ok(())
    }

    /// Applies defaults and bounds to a `page`/`limit` query.
    pub fn page_params(query: &PageQuery, default_limit: i64, max_limit: i64) -> AppResult<PageParams> {
        validate_positive_number(query.page, "page")?;
        validate_positive_number(query.limit, "limit")?;
        let limit = query.limit.unwrap_or(default_limit);
        if limit > max_limit {
            return Err(AppError::ValidationError {
                field: "limit".to_string(),
                message: format!("Value must be at most {}, got {}", max_limit, limit),
            });
        }
        Ok(PageParams { page: query.page.unwrap_or(1), limit })
    }

    /// Trims a text field; empty or missing becomes `None`.
    pub fn non_empty(value: Option<String>) -> Option<String> {
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}
