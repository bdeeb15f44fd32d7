//! Prompt assembly
//!
//! Templates live in the prompt bucket as `{submission type}.txt` and use
//! format-string placeholders: `{name}` is substituted, `{{` and `}}` are
//! literal braces.

use super::extractor::ExtractedContent;
use super::output_shapes::example_output_str;
use super::submission::{Submission, SubmissionType};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::storage::BlobStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Substitute `{name}` placeholders in `template`.
///
/// A placeholder may carry a conversion or format spec (`{name!r}`,
/// `{name:>10}`); only the name is used. Unknown names, empty or positional
/// fields, and unbalanced braces are template errors.
pub fn render_template(template: &str, values: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let start = pos + 1;
                let end = loop {
                    match chars.next() {
                        Some((i, '}')) => break i,
                        Some((_, '{')) | None => {
                            return Err(AppError::Template {
                                message: format!("Unmatched '{{' at byte {}", pos),
                            })
                        }
                        Some(_) => {}
                    }
                };

                let field = &template[start..end];
                let name = field
                    .split(|ch: char| ch == '!' || ch == ':')
                    .next()
                    .unwrap_or_default();

                if name.is_empty() || name.chars().all(|ch| ch.is_ascii_digit()) {
                    return Err(AppError::Template {
                        message: format!("Positional placeholder '{{{}}}' is not supported", field),
                    });
                }

                let value = values.get(name).ok_or_else(|| AppError::Template {
                    message: format!("Missing key '{}'", name),
                })?;
                out.push_str(value);
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(AppError::Template {
                    message: format!("Single '}}' encountered at byte {}", pos),
                })
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Placeholder values for one submission
pub fn placeholder_values<'a>(
    submission: &Submission,
    content: &ExtractedContent,
    reference_json: &str,
) -> HashMap<&'a str, String> {
    let submission_type = submission.submission_type;
    let only_for = |wanted: SubmissionType, value: Option<&String>| {
        if submission_type == wanted {
            value.cloned().unwrap_or_default()
        } else {
            String::new()
        }
    };

    HashMap::from([
        ("Book", only_for(SubmissionType::WorkbookScoring, submission.bookrange.as_ref())),
        ("learnsheet", only_for(SubmissionType::WorksheetCorrection, submission.learnsheets.as_ref())),
        ("grade_level", submission.grade_level.clone()),
        ("submission_type", submission_type.as_str().to_string()),
        ("essay_content", content.essay_content.clone()),
        (
            "standard_answer_if_any",
            only_for(SubmissionType::QuizCorrection, Some(&content.standard_answer)),
        ),
        (
            "scoring_instructions_if_any",
            only_for(SubmissionType::QuizCorrection, submission.scoring_instructions.as_ref()),
        ),
        ("json_format_example_str", example_output_str(submission_type)),
        ("current_lesson_standard_answers_json", reference_json.to_string()),
    ])
}

/// Loads templates and fills them in
pub struct PromptAssembler {
    store: Arc<dyn BlobStore>,
    bucket: String,
    prefix: String,
}

impl PromptAssembler {
    pub fn new(store: Arc<dyn BlobStore>, bucket: String, prefix: String) -> Self {
        Self { store, bucket, prefix }
    }

    /// Object path of the template for a category
    pub fn template_path(&self, submission_type: SubmissionType) -> String {
        format!("{}{}", self.prefix, submission_type.template_file())
    }

    /// Fetch the category's template. Templates are never cached.
    pub async fn load_template(&self, submission_type: SubmissionType) -> Result<String> {
        let path = self.template_path(submission_type);
        let location = format!("gs://{}/{}", self.bucket, path);

        let template = self
            .store
            .fetch_text(&self.bucket, &path)
            .await
            .map_err(|e| AppError::Template {
                message: format!("Failed to load prompt template for {} from {}: {}", submission_type, location, e),
            })?;

        metrics::record_storage_fetch("template", template.is_some());

        match template {
            Some(text) if !text.is_empty() => {
                tracing::debug!(location = %location, "Loaded prompt template");
                Ok(text)
            }
            _ => Err(AppError::Template {
                message: format!("Failed to load prompt template for {} from {}", submission_type, location),
            }),
        }
    }

    /// Build the final prompt text
    pub async fn assemble(
        &self,
        submission: &Submission,
        content: &ExtractedContent,
        reference_json: &str,
    ) -> Result<String> {
        let template = self.load_template(submission.submission_type).await?;
        let values = placeholder_values(submission, content, reference_json);
        render_template(&template, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::submission::RawSubmission;
    use crate::storage::MemoryStore;

    fn values(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_render_substitutes_and_unescapes() {
        let rendered = render_template(
            "年級：{grade_level}\n範例：{{\"a\": 1}}\n{essay_content}",
            &values(&[("grade_level", "七年級"), ("essay_content", "I {like} it")]),
        )
        .unwrap();
        assert_eq!(rendered, "年級：七年級\n範例：{\"a\": 1}\nI {like} it");
    }

    #[test]
    fn test_render_ignores_format_spec() {
        let rendered = render_template("{name!s}-{name:>4}", &values(&[("name", "x")])).unwrap();
        assert_eq!(rendered, "x-x");
    }

    #[test]
    fn test_render_errors() {
        let v = values(&[("a", "1")]);
        for template in ["{missing}", "{a", "a}", "{}", "{0}", "{a{b}"] {
            assert!(
                matches!(render_template(template, &v), Err(AppError::Template { .. })),
                "{template}"
            );
        }
    }

    fn submission(submission_type: &str) -> Submission {
        Submission::try_from(RawSubmission {
            submission_type: Some(submission_type.into()),
            grade_level: Some("九年級".into()),
            bookrange: Some("Book 5".into()),
            learnsheets: Some("Lesson 3".into()),
            scoring_instructions: Some("每錯一處扣一分".into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_placeholder_values_are_category_gated() {
        let content = ExtractedContent {
            essay_content: "essay".into(),
            standard_answer: "key".into(),
            ..Default::default()
        };

        let v = placeholder_values(&submission("讀寫習作評分"), &content, "{}");
        assert_eq!(v["Book"], "Book 5");
        assert_eq!(v["learnsheet"], "");
        assert_eq!(v["standard_answer_if_any"], "");
        assert_eq!(v["current_lesson_standard_answers_json"], "{}");

        let v = placeholder_values(&submission("測驗寫作評改"), &content, "");
        assert_eq!(v["standard_answer_if_any"], "key");
        assert_eq!(v["scoring_instructions_if_any"], "每錯一處扣一分");
        assert_eq!(v["Book"], "");
        assert!(v["json_format_example_str"].contains("error_analysis_table"));
    }

    #[tokio::test]
    async fn test_assemble_from_store() {
        let store = MemoryStore::new().with_object(
            "prompts",
            "ai_english_prompt/段落寫作評閱.txt",
            "請評閱{grade_level}學生的{submission_type}：\n{essay_content}\nJSON 輸出格式範例：\n{json_format_example_str}",
        );
        let assembler = PromptAssembler::new(Arc::new(store), "prompts".into(), "ai_english_prompt/".into());
        let content = ExtractedContent {
            essay_content: "My dog is cute.".into(),
            ..Default::default()
        };

        let prompt = assembler
            .assemble(&submission("段落寫作評閱"), &content, "")
            .await
            .unwrap();
        assert!(prompt.starts_with("請評閱九年級學生的段落寫作評閱：\nMy dog is cute.\n"));
        assert!(prompt.contains("\"model_paragraph\""));
    }

    #[tokio::test]
    async fn test_missing_template_is_template_error() {
        let assembler = PromptAssembler::new(Arc::new(MemoryStore::new()), "prompts".into(), "ai_english_prompt/".into());
        let err = assembler
            .assemble(&submission("學習單批改"), &ExtractedContent::default(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Template { .. }));
    }
}
