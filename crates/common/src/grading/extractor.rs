//! Content extraction
//!
//! Turns a submission into the text blob substituted into the prompt, plus
//! the image segments forwarded to the model for layout and handwriting
//! context.

use super::submission::{Submission, SubmissionType, Upload};
use crate::errors::{AppError, Result};
use crate::llm::Part;
use crate::ocr::OcrEngine;
use std::sync::Arc;

/// Separator between transcriptions of consecutive pages
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Used as the answer key when every answer-key page failed OCR
pub const ANSWER_KEY_OCR_FALLBACK: &str =
    "（標準答案圖片內容 OCR 失敗或為空，請參考隨後提供的原始圖片）";

const ANSWER_KEY_LEAD_IN: &str = "\n測驗的原始標準答案圖片內容，供您參考理解其版面和手寫內容：";

/// Text segment placed before the student's pages
fn student_lead_in(submission_type: SubmissionType) -> &'static str {
    match submission_type {
        SubmissionType::ParagraphReview | SubmissionType::QuizCorrection => {
            "學生提交的原始作業圖片內容，供您參考理解其版面和手寫內容："
        }
        SubmissionType::WorksheetCorrection => {
            "學生提交的原始學習單圖片內容，供您參考理解其版面和手寫內容："
        }
        SubmissionType::WorkbookScoring => {
            "學生提交的原始讀寫習作圖片內容，供您參考理解其版面和手寫內容："
        }
    }
}

fn missing_content_message(submission_type: SubmissionType) -> String {
    match submission_type {
        SubmissionType::ParagraphReview | SubmissionType::QuizCorrection => format!(
            "For {}, text input or an essay image is required.",
            submission_type
        ),
        SubmissionType::WorksheetCorrection => {
            "Learning sheet file is required for '學習單批改'.".to_string()
        }
        SubmissionType::WorkbookScoring => {
            "Reading/writing worksheet file is required for '讀寫習作評分'.".to_string()
        }
    }
}

fn ocr_failed_message(submission_type: SubmissionType) -> &'static str {
    match submission_type {
        SubmissionType::ParagraphReview | SubmissionType::QuizCorrection => {
            "OCR failed or returned empty for all provided images, and no text input."
        }
        SubmissionType::WorksheetCorrection => {
            "OCR failed or returned empty for all provided learning sheet images."
        }
        SubmissionType::WorkbookScoring => {
            "OCR failed or returned empty for all provided reading/writing worksheet images."
        }
    }
}

/// Output of the extraction stage
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// Student work as text
    pub essay_content: String,
    /// Lead-in text and raw image segments, in upload order
    pub image_parts: Vec<Part>,
    /// Processed answer key (quiz correction only, else empty)
    pub standard_answer: String,
}

/// Extracts text from typed input or uploaded pages
pub struct ContentExtractor {
    ocr: Arc<dyn OcrEngine>,
    max_upload_bytes: usize,
}

impl ContentExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, max_upload_bytes: usize) -> Self {
        Self { ocr, max_upload_bytes }
    }

    /// Extract the student's content and, for quiz correction, the answer key.
    ///
    /// Text-eligible categories use typed text first and fall back to their
    /// pages. The worksheet categories use their pages first and fall back to
    /// typed text only when no page was uploaded.
    pub async fn extract(&self, submission: &Submission) -> Result<ExtractedContent> {
        let submission_type = submission.submission_type;
        let mut content = ExtractedContent::default();

        let use_text = match (&submission.text, submission.images.is_empty()) {
            (Some(_), _) if submission_type.is_text_eligible() => true,
            (Some(_), true) => true,
            _ => false,
        };

        // typed text counts as present even when it is only whitespace
        if use_text {
            content.essay_content = submission.text.clone().unwrap_or_default();
        } else if submission.images.is_empty() {
            return Err(AppError::Extraction {
                message: missing_content_message(submission_type),
            });
        } else {
            self.check_sizes(&submission.images)?;
            content.image_parts.push(Part::text(student_lead_in(submission_type)));
            let transcripts = self
                .transcribe(&submission.images, &mut content.image_parts)
                .await;

            if transcripts.is_empty() {
                return Err(AppError::Extraction {
                    message: ocr_failed_message(submission_type).to_string(),
                });
            }
            content.essay_content = transcripts.join(PAGE_SEPARATOR);
        }

        if submission_type == SubmissionType::QuizCorrection {
            content.standard_answer = self
                .extract_answer_key(submission, &mut content.image_parts)
                .await?;
        }

        tracing::debug!(
            submission_type = %submission_type,
            content_chars = content.essay_content.chars().count(),
            image_parts = content.image_parts.len(),
            "Content extracted"
        );

        Ok(content)
    }

    async fn extract_answer_key(
        &self,
        submission: &Submission,
        parts: &mut Vec<Part>,
    ) -> Result<String> {
        if let Some(text) = &submission.standard_answer_text {
            return Ok(text.clone());
        }
        if submission.standard_answer_images.is_empty() {
            return Ok(String::new());
        }

        self.check_sizes(&submission.standard_answer_images)?;
        parts.push(Part::text(ANSWER_KEY_LEAD_IN));
        let transcripts = self
            .transcribe(&submission.standard_answer_images, parts)
            .await;

        if transcripts.is_empty() {
            tracing::warn!("OCR for all answer key images failed or returned empty");
            return Ok(ANSWER_KEY_OCR_FALLBACK.to_string());
        }
        Ok(transcripts.join(PAGE_SEPARATOR))
    }

    /// OCR every upload, appending each raw image to `parts`. Failed or blank
    /// transcriptions are skipped.
    async fn transcribe(&self, uploads: &[Upload], parts: &mut Vec<Part>) -> Vec<String> {
        let mut transcripts = Vec::with_capacity(uploads.len());

        for upload in uploads {
            match self.ocr.detect_text(&upload.bytes).await {
                Ok(text) if !text.trim().is_empty() => transcripts.push(text),
                Ok(_) => {
                    tracing::info!(file = %upload.file_name, "OCR returned no text");
                }
                Err(e) => {
                    tracing::warn!(
                        file = %upload.file_name,
                        error = %e,
                        "OCR failed, skipping file for OCR content"
                    );
                }
            }
            parts.push(Part::image(upload.content_type.clone(), upload.bytes.clone()));
        }

        transcripts
    }

    fn check_sizes(&self, uploads: &[Upload]) -> Result<()> {
        match uploads.iter().find(|u| u.bytes.len() > self.max_upload_bytes) {
            Some(upload) => Err(AppError::PayloadTooLarge {
                file_name: upload.file_name.clone(),
                size: upload.bytes.len(),
                limit: self.max_upload_bytes,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::submission::RawSubmission;
    use crate::ocr::MockOcr;

    const LIMIT: usize = 1024;

    fn submission(submission_type: SubmissionType) -> Submission {
        Submission::try_from(RawSubmission {
            submission_type: Some(submission_type.as_str().into()),
            grade_level: Some("八年級".into()),
            ..Default::default()
        })
        .unwrap()
    }

    fn page(name: &str, bytes: &[u8]) -> Upload {
        Upload::new(name, Some("image/jpeg"), bytes.to_vec())
    }

    fn extractor(ocr: MockOcr) -> ContentExtractor {
        ContentExtractor::new(Arc::new(ocr), LIMIT)
    }

    #[tokio::test]
    async fn test_text_wins_for_text_eligible() {
        let mut s = submission(SubmissionType::ParagraphReview);
        s.text = Some("My summer vacation.".into());
        s.images = vec![page("p1.jpg", b"ignored")];

        let content = extractor(MockOcr::new()).extract(&s).await.unwrap();
        assert_eq!(content.essay_content, "My summer vacation.");
        assert!(content.image_parts.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_text_is_used_verbatim() {
        let mut s = submission(SubmissionType::ParagraphReview);
        s.text = Some("   ".into());

        let content = extractor(MockOcr::new()).extract(&s).await.unwrap();
        assert_eq!(content.essay_content, "   ");
        assert!(content.image_parts.is_empty());
    }

    #[tokio::test]
    async fn test_pages_are_joined_and_forwarded() {
        let mut s = submission(SubmissionType::WorkbookScoring);
        s.text = Some("typed text is ignored when pages exist".into());
        s.images = vec![page("p1.jpg", b"one"), page("p2.jpg", b"bad"), page("p3.jpg", b"three")];

        let ocr = MockOcr::new()
            .with_text(b"one", "Page one")
            .with_failure(b"bad", "unreadable")
            .with_text(b"three", "Page three");
        let content = extractor(ocr).extract(&s).await.unwrap();

        assert_eq!(content.essay_content, "Page one\n\nPage three");
        // lead-in + every page, including the one that failed OCR
        assert_eq!(content.image_parts.len(), 4);
        assert_eq!(content.image_parts[0], Part::text(student_lead_in(SubmissionType::WorkbookScoring)));
        assert_eq!(content.image_parts[2], Part::image("image/jpeg", b"bad".to_vec()));
    }

    #[tokio::test]
    async fn test_no_text_and_no_pages_is_extraction_error() {
        for t in SubmissionType::ALL {
            let err = extractor(MockOcr::new()).extract(&submission(t)).await.unwrap_err();
            assert!(matches!(err, AppError::Extraction { .. }), "{t}");
        }
    }

    #[tokio::test]
    async fn test_all_ocr_failures_is_extraction_error() {
        let mut s = submission(SubmissionType::QuizCorrection);
        s.images = vec![page("p1.jpg", b"x"), page("p2.jpg", b"y")];
        let ocr = MockOcr::new().with_failure(b"x", "e").with_text(b"y", "   ");

        let err = extractor(ocr).extract(&s).await.unwrap_err();
        match err {
            AppError::Extraction { message } => assert!(message.contains("OCR failed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worksheet_falls_back_to_text_without_pages() {
        let mut s = submission(SubmissionType::WorksheetCorrection);
        s.text = Some("1. Yes, I do.".into());
        let content = extractor(MockOcr::new()).extract(&s).await.unwrap();
        assert_eq!(content.essay_content, "1. Yes, I do.");
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let mut s = submission(SubmissionType::ParagraphReview);
        s.images = vec![page("huge.jpg", &vec![0u8; LIMIT + 1])];
        let err = extractor(MockOcr::new()).extract(&s).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_answer_key_text_and_images() {
        let mut s = submission(SubmissionType::QuizCorrection);
        s.text = Some("essay".into());
        s.standard_answer_text = Some("typed key".into());
        s.standard_answer_images = vec![page("key.jpg", b"key")];
        let content = extractor(MockOcr::new()).extract(&s).await.unwrap();
        assert_eq!(content.standard_answer, "typed key");
        assert!(content.image_parts.is_empty());

        s.standard_answer_text = None;
        let content = extractor(MockOcr::new().with_text(b"key", "A B C"))
            .extract(&s)
            .await
            .unwrap();
        assert_eq!(content.standard_answer, "A B C");
        assert_eq!(content.image_parts.len(), 2);
        assert_eq!(content.image_parts[0], Part::text(ANSWER_KEY_LEAD_IN));
    }

    #[tokio::test]
    async fn test_answer_key_ocr_failure_uses_placeholder() {
        let mut s = submission(SubmissionType::QuizCorrection);
        s.text = Some("essay".into());
        s.standard_answer_images = vec![page("key.jpg", b"key")];
        let content = extractor(MockOcr::new().with_failure(b"key", "e"))
            .extract(&s)
            .await
            .unwrap();
        assert_eq!(content.standard_answer, ANSWER_KEY_OCR_FALLBACK);
    }
}
