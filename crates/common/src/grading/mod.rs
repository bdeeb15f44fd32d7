//! Essay grading
//!
//! Validated submissions flow through extraction, answer-key lookup, prompt
//! assembly, the model call, and response normalization.

pub mod client;
pub mod extractor;
pub mod normalizer;
pub mod output_shapes;
pub mod pipeline;
pub mod prompt;
pub mod reference;
pub mod submission;

pub use client::GradingClient;
pub use extractor::{ContentExtractor, ExtractedContent};
pub use normalizer::normalize;
pub use pipeline::GradingPipeline;
pub use prompt::{render_template, PromptAssembler};
pub use reference::ReferenceLoader;
pub use submission::{RawSubmission, Submission, SubmissionType, Upload};
