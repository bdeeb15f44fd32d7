//! Tutorgrade Common Library
//!
//! Shared code for the Tutorgrade grading service including:
//! - Submission validation and the grading pipeline
//! - OCR, object storage, and generative model client abstractions
//! - Google Cloud access tokens
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod errors;
pub mod grading;
pub mod llm;
pub mod metrics;
pub mod ocr;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use grading::{GradingPipeline, RawSubmission, Submission, SubmissionType};
pub use llm::GenerativeModel;
pub use ocr::OcrEngine;
pub use storage::BlobStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
