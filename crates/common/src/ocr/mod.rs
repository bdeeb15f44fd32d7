//! OCR service abstraction
//!
//! Binary image in, plain text out. The production engine calls the
//! Google Cloud Vision `images:annotate` endpoint with `TEXT_DETECTION`.

use crate::auth::TokenSource;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Trait for text detection on images
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Transcribe the text in one image. An image without text yields an
    /// empty string, not an error.
    async fn detect_text(&self, image: &[u8]) -> Result<String>;
}

/// Google Cloud Vision OCR client
pub struct VisionOcr {
    client: reqwest::Client,
    tokens: Arc<TokenSource>,
    base_url: String,
    project_id: String,
}

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<StatusMessage>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct StatusMessage {
    #[serde(default)]
    message: String,
}

impl VisionOcr {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<TokenSource>,
        base_url: String,
        project_id: String,
    ) -> Self {
        Self {
            client,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
        }
    }

    async fn annotate(&self, image: &[u8]) -> Result<String> {
        let url = format!("{}/images:annotate", self.base_url);

        let request = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(image),
                },
                features: vec![Feature { kind: "TEXT_DETECTION" }],
            }],
        };

        let token = self.tokens.token().await?;
        let mut builder = self.client.post(&url).bearer_auth(token).json(&request);
        if !self.project_id.is_empty() {
            builder = builder.header("x-goog-user-project", &self.project_id);
        }

        let response = builder.send().await.map_err(|e| AppError::Ocr {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Ocr {
                message: format!("Vision API error {}: {}", status, body),
            });
        }

        let result: AnnotateResponse = response.json().await.map_err(|e| AppError::Ocr {
            message: format!("Failed to parse response: {}", e),
        })?;

        let Some(first) = result.responses.into_iter().next() else {
            return Ok(String::new());
        };

        if let Some(error) = first.error.filter(|e| !e.message.is_empty()) {
            return Err(AppError::Ocr {
                message: format!("Vision API error: {}", error.message),
            });
        }

        Ok(first
            .text_annotations
            .into_iter()
            .next()
            .map(|a| a.description)
            .unwrap_or_default())
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn detect_text(&self, image: &[u8]) -> Result<String> {
        let start = Instant::now();
        let result = self.annotate(image).await;
        metrics::record_ocr(start.elapsed().as_secs_f64(), result.is_ok());

        match &result {
            Ok(text) => tracing::debug!(
                image_size = image.len(),
                text_len = text.len(),
                "OCR completed"
            ),
            Err(e) => tracing::warn!(image_size = image.len(), error = %e, "OCR failed"),
        }

        result
    }
}

/// Mock OCR engine for testing.
///
/// Returns the transcription registered for an exact image payload, fails
/// for payloads registered as failures, and echoes UTF-8 payloads otherwise.
#[derive(Default)]
pub struct MockOcr {
    transcripts: HashMap<Vec<u8>, std::result::Result<String, String>>,
}

impl MockOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, image: &[u8], text: &str) -> Self {
        self.transcripts.insert(image.to_vec(), Ok(text.to_string()));
        self
    }

    pub fn with_failure(mut self, image: &[u8], message: &str) -> Self {
        self.transcripts.insert(image.to_vec(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn detect_text(&self, image: &[u8]) -> Result<String> {
        match self.transcripts.get(image) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(AppError::Ocr { message: message.clone() }),
            None => Ok(String::from_utf8_lossy(image).into_owned()),
        }
    }
}
