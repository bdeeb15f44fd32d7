//! Submission types
//!
//! A submission lives for one request. `RawSubmission` holds the fields as
//! they arrived (multipart form, JSON body, or url-encoded form) and
//! `Submission` is the validated form the pipeline works on.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationErrors};

/// The four assignment categories the service grades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionType {
    /// Paragraph writing review
    #[serde(rename = "段落寫作評閱")]
    ParagraphReview,
    /// Quiz writing correction, optionally against an answer key
    #[serde(rename = "測驗寫作評改")]
    QuizCorrection,
    /// Worksheet correction
    #[serde(rename = "學習單批改")]
    WorksheetCorrection,
    /// Reading/writing workbook scoring
    #[serde(rename = "讀寫習作評分")]
    WorkbookScoring,
}

impl SubmissionType {
    pub const ALL: [SubmissionType; 4] = [
        SubmissionType::ParagraphReview,
        SubmissionType::QuizCorrection,
        SubmissionType::WorksheetCorrection,
        SubmissionType::WorkbookScoring,
    ];

    /// Wire name, also the prompt template's base name
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::ParagraphReview => "段落寫作評閱",
            SubmissionType::QuizCorrection => "測驗寫作評改",
            SubmissionType::WorksheetCorrection => "學習單批改",
            SubmissionType::WorkbookScoring => "讀寫習作評分",
        }
    }

    /// Categories whose typed text takes precedence over uploaded images
    pub fn is_text_eligible(&self) -> bool {
        matches!(
            self,
            SubmissionType::ParagraphReview | SubmissionType::QuizCorrection
        )
    }

    /// Multipart field carrying the student's pages
    pub fn image_field(&self) -> &'static str {
        match self {
            SubmissionType::ParagraphReview | SubmissionType::QuizCorrection => "essayImage",
            SubmissionType::WorksheetCorrection => "learningSheetFile",
            SubmissionType::WorkbookScoring => "readingWritingFile",
        }
    }

    /// Object name of the prompt template
    pub fn template_file(&self) -> String {
        format!("{}.txt", self.as_str())
    }
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        SubmissionType::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| AppError::UnsupportedSubmissionType {
                value: value.to_string(),
            })
    }
}

/// One uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";

    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type
                .filter(|c| !c.is_empty())
                .unwrap_or(Self::DEFAULT_CONTENT_TYPE)
                .to_string(),
            bytes,
        }
    }
}

/// Request fields before validation. Keys follow the HTTP field names.
///
/// JSON numbers and booleans are accepted for the text fields and kept in
/// their printed form.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    #[validate(required, length(min = 1))]
    #[serde(default, deserialize_with = "lenient_string")]
    pub submission_type: Option<String>,
    #[validate(required, length(min = 1))]
    #[serde(default, deserialize_with = "lenient_string")]
    pub grade_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bookrange: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub learnsheets: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub worksheet_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub standard_answer_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scoring_instructions: Option<String>,

    #[serde(skip)]
    pub essay_images: Vec<Upload>,
    #[serde(skip)]
    pub learning_sheet_files: Vec<Upload>,
    #[serde(skip)]
    pub reading_writing_files: Vec<Upload>,
    #[serde(skip)]
    pub standard_answer_images: Vec<Upload>,
}

impl RawSubmission {
    /// Store a text field by its HTTP name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "submissionType" => &mut self.submission_type,
            "gradeLevel" => &mut self.grade_level,
            "text" => &mut self.text,
            "bookrange" => &mut self.bookrange,
            "learnsheets" => &mut self.learnsheets,
            "worksheetCategory" => &mut self.worksheet_category,
            "standardAnswerText" => &mut self.standard_answer_text,
            "scoringInstructions" => &mut self.scoring_instructions,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Store an uploaded file by its HTTP field name. Returns false for
    /// fields that do not carry files.
    pub fn add_upload(&mut self, name: &str, upload: Upload) -> bool {
        let list = match name {
            "essayImage" => &mut self.essay_images,
            "learningSheetFile" => &mut self.learning_sheet_files,
            "readingWritingFile" => &mut self.reading_writing_files,
            "standardAnswerImage" => &mut self.standard_answer_images,
            _ => return false,
        };
        list.push(upload);
        true
    }

    /// Whether `name` is one of the file fields
    pub fn is_file_field(name: &str) -> bool {
        matches!(
            name,
            "essayImage" | "learningSheetFile" | "readingWritingFile" | "standardAnswerImage"
        )
    }
}

/// A validated submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub submission_type: SubmissionType,
    pub grade_level: String,
    pub text: Option<String>,
    /// Workbook volume key, e.g. "Book 5" (workbook scoring only)
    pub bookrange: Option<String>,
    /// Worksheet lesson key, e.g. "Lesson 1" (worksheet correction only)
    pub learnsheets: Option<String>,
    /// Worksheet family, e.g. "差異化學習單參考答案" (worksheet correction only)
    pub worksheet_category: Option<String>,
    /// Student pages for this submission's category
    pub images: Vec<Upload>,
    /// Answer key text (quiz correction only)
    pub standard_answer_text: Option<String>,
    /// Answer key pages (quiz correction only)
    pub standard_answer_images: Vec<Upload>,
    /// Teacher's grading instructions (quiz correction only)
    pub scoring_instructions: Option<String>,
}

/// Strings as sent; numbers and booleans printed; null as absent
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// HTTP names of the fields that failed validation, in request order
fn missing_fields(errors: &ValidationErrors) -> String {
    let failed = errors.field_errors();
    [("submission_type", "submissionType"), ("grade_level", "gradeLevel")]
        .into_iter()
        .filter(|(field, http_name)| failed.contains_key(*field) || failed.contains_key(*http_name))
        .map(|(_, http_name)| http_name)
        .collect::<Vec<_>>()
        .join(" and ")
}

impl TryFrom<RawSubmission> for Submission {
    type Error = AppError;

    fn try_from(raw: RawSubmission) -> Result<Self> {
        raw.validate().map_err(|e| AppError::MissingField {
            field: missing_fields(&e),
        })?;

        let (Some(submission_type), Some(grade_level)) = (raw.submission_type, raw.grade_level) else {
            return Err(AppError::MissingField {
                field: "submissionType and gradeLevel".to_string(),
            });
        };
        let submission_type: SubmissionType = submission_type.parse()?;

        let is_quiz = submission_type == SubmissionType::QuizCorrection;
        let is_worksheet = submission_type == SubmissionType::WorksheetCorrection;
        let is_workbook = submission_type == SubmissionType::WorkbookScoring;

        let images = match submission_type {
            SubmissionType::ParagraphReview | SubmissionType::QuizCorrection => raw.essay_images,
            SubmissionType::WorksheetCorrection => raw.learning_sheet_files,
            SubmissionType::WorkbookScoring => raw.reading_writing_files,
        };

        Ok(Submission {
            submission_type,
            grade_level,
            text: non_empty(raw.text),
            bookrange: non_empty(raw.bookrange).filter(|_| is_workbook),
            learnsheets: non_empty(raw.learnsheets).filter(|_| is_worksheet),
            worksheet_category: non_empty(raw.worksheet_category).filter(|_| is_worksheet),
            images,
            standard_answer_text: non_empty(raw.standard_answer_text).filter(|_| is_quiz),
            standard_answer_images: if is_quiz { raw.standard_answer_images } else { Vec::new() },
            scoring_instructions: non_empty(raw.scoring_instructions).filter(|_| is_quiz),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(submission_type: &str) -> RawSubmission {
        RawSubmission {
            submission_type: Some(submission_type.into()),
            grade_level: Some("七年級".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_all_types() {
        for t in SubmissionType::ALL {
            assert_eq!(t.as_str().parse::<SubmissionType>().unwrap(), t);
            assert_eq!(
                serde_json::to_value(t).unwrap(),
                serde_json::Value::String(t.as_str().into())
            );
        }
        assert!(matches!(
            "作文".parse::<SubmissionType>(),
            Err(AppError::UnsupportedSubmissionType { .. })
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        let mut r = raw("段落寫作評閱");
        r.grade_level = Some(String::new());
        match Submission::try_from(r) {
            Err(AppError::MissingField { field }) => assert_eq!(field, "gradeLevel"),
            other => panic!("unexpected result: {other:?}"),
        }

        match Submission::try_from(RawSubmission::default()) {
            Err(AppError::MissingField { field }) => assert_eq!(field, "submissionType and gradeLevel"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_flags_required_fields() {
        let r = RawSubmission {
            grade_level: Some("七年級".into()),
            ..Default::default()
        };
        let errors = r.validate().unwrap_err();
        assert_eq!(errors.field_errors().len(), 1);
        assert!(raw("段落寫作評閱").validate().is_ok());
    }

    #[test]
    fn test_non_string_json_values() {
        let r: RawSubmission = serde_json::from_str(
            r#"{"submissionType":"段落寫作評閱","gradeLevel":7,"text":true,"bookrange":null}"#,
        )
        .unwrap();
        assert_eq!(r.grade_level.as_deref(), Some("7"));
        assert_eq!(r.text.as_deref(), Some("true"));
        assert_eq!(r.bookrange, None);

        let s = Submission::try_from(r).unwrap();
        assert_eq!(s.grade_level, "7");
    }

    #[test]
    fn test_category_specific_fields_are_gated() {
        let mut r = raw("段落寫作評閱");
        r.bookrange = Some("Book 5".into());
        r.standard_answer_text = Some("key".into());
        r.learnsheets = Some("Lesson 1".into());
        let s = Submission::try_from(r).unwrap();
        assert_eq!(s.bookrange, None);
        assert_eq!(s.standard_answer_text, None);
        assert_eq!(s.learnsheets, None);

        let mut r = raw("讀寫習作評分");
        r.bookrange = Some("Book 5".into());
        let s = Submission::try_from(r).unwrap();
        assert_eq!(s.bookrange.as_deref(), Some("Book 5"));
    }

    #[test]
    fn test_images_follow_category_field() {
        let mut r = raw("學習單批改");
        assert!(r.add_upload("essayImage", Upload::new("a.png", Some("image/png"), vec![1])));
        assert!(r.add_upload("learningSheetFile", Upload::new("b.png", None, vec![2])));
        assert!(!r.add_upload("avatar", Upload::new("c.png", None, vec![3])));

        let s = Submission::try_from(r).unwrap();
        assert_eq!(s.images.len(), 1);
        assert_eq!(s.images[0].file_name, "b.png");
        assert_eq!(s.images[0].content_type, Upload::DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_json_keys() {
        let r: RawSubmission = serde_json::from_str(
            r#"{"submissionType":"測驗寫作評改","gradeLevel":"九年級","text":"hi","standardAnswerText":"ans","scoringInstructions":"strict"}"#,
        )
        .unwrap();
        let s = Submission::try_from(r).unwrap();
        assert_eq!(s.submission_type, SubmissionType::QuizCorrection);
        assert_eq!(s.standard_answer_text.as_deref(), Some("ans"));
        assert_eq!(s.scoring_instructions.as_deref(), Some("strict"));
    }

    #[test]
    fn test_set_field() {
        let mut r = RawSubmission::default();
        r.set_field("worksheetCategory", "差異化學習單參考答案".into());
        r.set_field("unknown", "x".into());
        assert_eq!(r.worksheet_category.as_deref(), Some("差異化學習單參考答案"));
        assert!(RawSubmission::is_file_field("standardAnswerImage"));
        assert!(!RawSubmission::is_file_field("text"));
    }
}
