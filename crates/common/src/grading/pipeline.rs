//! Grading pipeline
//!
//! submission → extracted content → reference entry → prompt → model text →
//! result object. Each stage fails with its own error kind; nothing is
//! persisted between requests.

use super::client::GradingClient;
use super::extractor::ContentExtractor;
use super::normalizer::normalize;
use super::prompt::PromptAssembler;
use super::reference::{render_reference, ReferenceLoader};
use super::submission::Submission;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::llm::GenerativeModel;
use crate::metrics;
use crate::ocr::OcrEngine;
use crate::storage::BlobStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Grading service shared by all requests
pub struct GradingPipeline {
    extractor: ContentExtractor,
    references: ReferenceLoader,
    prompts: PromptAssembler,
    client: GradingClient,
}

impl GradingPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        store: Arc<dyn BlobStore>,
        model: Arc<dyn GenerativeModel>,
        config: &AppConfig,
    ) -> Self {
        let bucket = config.gcp.prompt_bucket.clone();
        let layout = &config.storage_layout;

        Self {
            extractor: ContentExtractor::new(ocr, config.max_upload_bytes()),
            references: ReferenceLoader::new(store.clone(), bucket.clone(), layout.answer_prefix.clone()),
            prompts: PromptAssembler::new(store, bucket, layout.prompt_prefix.clone()),
            client: GradingClient::new(model, config),
        }
    }

    /// Grade one submission and return the result object
    pub async fn grade(&self, submission: Submission) -> Result<Value> {
        let start = Instant::now();
        let submission_type = submission.submission_type;

        tracing::info!(
            submission_type = %submission_type,
            grade_level = %submission.grade_level,
            images = submission.images.len(),
            has_text = submission.text.is_some(),
            "Grading submission"
        );

        let result = self.run(&submission).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) if e.is_client_error() => "rejected",
            Err(_) => "error",
        };
        metrics::record_grading(start.elapsed().as_secs_f64(), submission_type.as_str(), outcome);

        match &result {
            Ok(_) => tracing::info!(
                submission_type = %submission_type,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Grading completed"
            ),
            Err(e) => tracing::warn!(
                submission_type = %submission_type,
                error = %e,
                "Grading failed"
            ),
        }

        result
    }

    async fn run(&self, submission: &Submission) -> Result<Value> {
        let content = self.extractor.extract(submission).await?;

        let reference_json = self
            .references
            .load(submission)
            .await
            .map(|entry| render_reference(&entry))
            .unwrap_or_default();

        let prompt = self
            .prompts
            .assemble(submission, &content, &reference_json)
            .await?;

        let text = self.client.invoke(prompt, &content.image_parts).await?;
        let result = normalize(&text, submission.submission_type)?;

        Ok(Value::Object(result))
    }
}
