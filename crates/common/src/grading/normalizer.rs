//! Response normalization
//!
//! The model is asked for JSON but sometimes wraps it in a fenced
//! ```` ```json ```` block. The first fenced object wins; otherwise the whole
//! text is parsed.

use super::submission::SubmissionType;
use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("fenced JSON pattern is valid")
});

/// The JSON candidate inside the model text
pub fn extract_json_text(text: &str) -> &str {
    FENCED_JSON
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// Parse the model text into a result object and stamp the submission type
pub fn normalize(text: &str, submission_type: SubmissionType) -> Result<Map<String, Value>> {
    let candidate = extract_json_text(text);

    let parsed: Value = serde_json::from_str(candidate).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse model response as JSON");
        AppError::malformed(text)
    })?;

    let Value::Object(mut result) = parsed else {
        tracing::error!("Model response is JSON but not an object");
        return Err(AppError::malformed(text));
    };

    let expected = submission_type.as_str();
    let stamped = result.get("submissionType").and_then(Value::as_str);
    if stamped != Some(expected) {
        tracing::warn!(
            returned = ?stamped,
            expected = %expected,
            "Model returned wrong or missing submissionType, correcting"
        );
        result.insert("submissionType".to_string(), Value::String(expected.to_string()));
    }

    Ok(result)
}
