//! Error types for Tutorgrade services
//!
//! Provides a single error enum for the grading pipeline with:
//! - Distinct error types for each pipeline stage
//! - HTTP status code mapping
//! - A flat JSON error envelope
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Maximum number of characters of upstream text echoed back for diagnostics
pub const DETAILS_PREVIEW_CHARS: usize = 500;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request errors
    ValidationError,
    MissingField,
    UnsupportedSubmissionType,
    PayloadTooLarge,
    RateLimited,

    // Pipeline errors
    ExtractionError,
    TemplateError,
    ModelCallError,
    EmptyResponse,
    MalformedResponse,

    // External service errors
    StorageError,
    OcrError,
    AuthError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Request errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Missing {field} after parsing request")]
    MissingField { field: String },

    #[error("Unsupported submission type: {value}")]
    UnsupportedSubmissionType { value: String },

    #[error("File {file_name} is too large ({size} bytes), limit is {limit} bytes")]
    PayloadTooLarge { file_name: String, size: usize, limit: usize },

    #[error("Request body is larger than the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    #[error("Rate limit exceeded")]
    RateLimited,

    // Pipeline errors
    #[error("{message}")]
    Extraction { message: String },

    #[error("Prompt template error: {message}")]
    Template { message: String },

    #[error("AI model API call failed.")]
    ModelCall { details: String },

    #[error("AI model did not return a valid response (it might have been blocked).")]
    EmptyResponse { reason: String },

    #[error("AI response format error (cannot parse JSON).")]
    MalformedResponse { raw_preview: String },

    // External service errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("OCR error: {message}")]
    Ocr { message: String },

    #[error("Access token error: {message}")]
    Auth { message: String },
}

impl AppError {
    /// Build a malformed-response error, keeping only a prefix of the raw text
    pub fn malformed(raw: &str) -> Self {
        AppError::MalformedResponse {
            raw_preview: truncate_chars(raw, DETAILS_PREVIEW_CHARS),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::UnsupportedSubmissionType { .. } => ErrorCode::UnsupportedSubmissionType,
            AppError::PayloadTooLarge { .. } | AppError::BodyTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::Extraction { .. } => ErrorCode::ExtractionError,
            AppError::Template { .. } => ErrorCode::TemplateError,
            AppError::ModelCall { .. } => ErrorCode::ModelCallError,
            AppError::EmptyResponse { .. } => ErrorCode::EmptyResponse,
            AppError::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Ocr { .. } => ErrorCode::OcrError,
            AppError::Auth { .. } => ErrorCode::AuthError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::MissingField { .. } |
            AppError::UnsupportedSubmissionType { .. } |
            AppError::Extraction { .. } => StatusCode::BAD_REQUEST,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } |
            AppError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Template { .. } |
            AppError::ModelCall { .. } |
            AppError::EmptyResponse { .. } |
            AppError::MalformedResponse { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Storage { .. } |
            AppError::Ocr { .. } |
            AppError::Auth { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Diagnostic text returned to the caller next to the message
    pub fn details_for_log(&self) -> Option<String> {
        match self {
            AppError::ModelCall { details } => Some(details.clone()),
            AppError::EmptyResponse { reason } => Some(reason.clone()),
            AppError::MalformedResponse { raw_preview } => Some(raw_preview.clone()),
            _ => None,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_for_log: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let details_for_log = self.details_for_log();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                details = details_for_log.as_deref().unwrap_or_default(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: message,
            code,
            details_for_log,
        };

        (status, Json(body)).into_response()
    }
}

/// Keep at most `max` characters of `text`, on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
