//! Answer-key lookup
//!
//! Worksheet correction and workbook scoring can be graded against a
//! registered answer key. Each key file is a JSON object keyed by lesson or
//! book; only the requested entry is handed to the prompt. A missing entry
//! is not an error: the model then relies on its retrieval tool.

use super::submission::{Submission, SubmissionType};
use crate::metrics;
use crate::storage::BlobStore;
use serde_json::Value;
use std::sync::Arc;

/// Suffix appended to the grade level for workbook answer keys
pub const WORKBOOK_ANSWER_SUFFIX: &str = "讀寫習作參考答案";

/// `{grade}{category}` → answer-key file name
const ANSWER_FILES: &[(&str, &str)] = &[
    ("七年級全英提問學習單參考答案", "全英提問學習單參考答案(01_1下).txt"),
    ("八年級全英提問學習單參考答案", "全英提問學習單參考答案(01_2下).txt"),
    ("九年級全英提問學習單參考答案", "全英提問學習單參考答案(01_3下).txt"),
    ("七年級差異化學習單參考答案", "差異化學習單參考答案(01_1下).txt"),
    ("八年級差異化學習單參考答案", "差異化學習單參考答案(01_2下).txt"),
    ("九年級差異化學習單參考答案", "差異化學習單參考答案(01_3下).txt"),
    ("七年級讀寫習作參考答案", "113_1習作標準答案.txt"),
    ("八年級讀寫習作參考答案", "113_2習作標準答案.txt"),
    ("九年級讀寫習作參考答案", "113_3習作標準答案.txt"),
];

/// File registered for a grade/category combination
pub fn answer_file(grade_level: &str, category: &str) -> Option<&'static str> {
    let key = format!("{}{}", grade_level, category);
    ANSWER_FILES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, file)| *file)
}

/// Which file and which entry a submission asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceQuery {
    pub file: &'static str,
    pub entry: String,
}

impl ReferenceQuery {
    /// `None` when the category never uses answer keys, the keys are missing,
    /// or the combination is not registered
    pub fn for_submission(submission: &Submission) -> Option<Self> {
        let (category, entry) = match submission.submission_type {
            SubmissionType::WorksheetCorrection => (
                submission.worksheet_category.as_deref()?,
                submission.learnsheets.as_deref()?,
            ),
            SubmissionType::WorkbookScoring => {
                (WORKBOOK_ANSWER_SUFFIX, submission.bookrange.as_deref()?)
            }
            SubmissionType::ParagraphReview | SubmissionType::QuizCorrection => return None,
        };

        match answer_file(&submission.grade_level, category) {
            Some(file) => Some(Self {
                file,
                entry: entry.to_string(),
            }),
            None => {
                tracing::warn!(
                    grade_level = %submission.grade_level,
                    category = %category,
                    "No answer key registered for grade and category"
                );
                None
            }
        }
    }
}

/// Python-style truthiness, used to treat empty entries as absent
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Render a reference entry the way it is shown to the model
pub fn render_reference(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Fetches answer-key entries from the prompt bucket
pub struct ReferenceLoader {
    store: Arc<dyn BlobStore>,
    bucket: String,
    prefix: String,
}

impl ReferenceLoader {
    pub fn new(store: Arc<dyn BlobStore>, bucket: String, prefix: String) -> Self {
        Self { store, bucket, prefix }
    }

    /// Answer-key entry for the submission, or `None` when not found
    pub async fn load(&self, submission: &Submission) -> Option<Value> {
        let query = ReferenceQuery::for_submission(submission)?;
        let path = format!("{}{}", self.prefix, query.file);

        let text = match self.store.fetch_text(&self.bucket, &path).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!(bucket = %self.bucket, path = %path, "Answer key file not found");
                metrics::record_storage_fetch("answer_key", false);
                return None;
            }
            Err(e) => {
                tracing::warn!(bucket = %self.bucket, path = %path, error = %e, "Failed to fetch answer key");
                metrics::record_storage_fetch("answer_key", false);
                return None;
            }
        };
        metrics::record_storage_fetch("answer_key", true);

        let mut document: Value = match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Answer key file is not valid JSON");
                return None;
            }
        };

        match document.get_mut(&query.entry).map(Value::take) {
            Some(entry) if !is_blank(&entry) => {
                tracing::info!(entry = %query.entry, file = %query.file, "Loaded answer key entry");
                Some(entry)
            }
            _ => {
                tracing::warn!(
                    entry = %query.entry,
                    file = %query.file,
                    "Entry not found in answer key file, relying on retrieval tool"
                );
                None
            }
        }
    }
}
