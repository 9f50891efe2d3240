//! # Error Handling
//!
//! Custom error types and how they're converted to HTTP responses.
//!
//! ## Response shape:
//! Every error, whatever its variant, renders the same JSON body the clients expect:
//! ```json
//! {
//!   "success": false,
//!   "error": "Conversation not found. Please start a new conversation.",
//!   "timestamp": "2025-01-01T12:00:00.000Z"
//! }
//! ```
//! The message is sent as-is; internal details beyond that string never leave the server.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **ValidationError**: Data validation failed (400 errors)
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::BadRequest("No audio file provided".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (provider failures, filesystem failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl AppError {
    /// The bare message, without the category prefix used by `Display`.
    pub fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts errors into `{success: false, error, timestamp}` responses.
///
/// ## HTTP Status Code Mapping:
/// - Internal → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.message(),
            "timestamp": crate::timestamp_now()
        }))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
