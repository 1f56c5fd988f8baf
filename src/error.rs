//! # Error Handling
//!
//! This module defines the application error type and how it's converted to HTTP responses.
//!
//! ## Error Categories:
//! - **BadRequest**: Client sent something we refuse outright (400)
//! - **ValidationError**: A parameter is missing, malformed or out of range (422)
//! - **PayloadTooLarge**: Upload exceeded the configured limit (413)
//! - **Transcription**: The speech model failed on the upload (500)
//! - **Internal**: Temp-file I/O or worker pool problems (500)
//!
//! ## JSON Response Format:
//! Every error renders as a single `detail` field, which is what the
//! frontend reads:
//! ```json
//! { "detail": "Only audio files are allowed" }
//! ```

use crate::transcription::TranscriptionError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Client sent data we will not process
    #[error("{0}")]
    BadRequest(String),

    /// User input failed validation rules
    #[error("{0}")]
    ValidationError(String),

    /// Upload exceeded `server.max_upload_mb`
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The transcription facade reported a failure
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    /// Internal server errors (temp files, blocking pool, etc.)
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Transcription(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "detail": self.to_string()
        }))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("Worker pool error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
