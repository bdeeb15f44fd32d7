//! Model invocation
//!
//! Wraps a `GenerativeModel` with the fixed grading settings: JSON response
//! type, disabled safety blocking, and the answer-key datastore as a
//! retrieval tool.

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::llm::{GenerateRequest, GenerationSettings, GenerativeModel, Part, SafetySetting};
use std::sync::Arc;

/// Response MIME type requested from the model
pub const RESPONSE_MIME_TYPE: &str = "application/json";

pub struct GradingClient {
    model: Arc<dyn GenerativeModel>,
    generation: GenerationSettings,
    safety: Vec<SafetySetting>,
    datastore: Option<String>,
}

impl GradingClient {
    pub fn new(model: Arc<dyn GenerativeModel>, config: &AppConfig) -> Self {
        let datastore = (!config.gcp.datastore_id.is_empty())
            .then(|| config.gcp.datastore_resource_name());

        Self {
            model,
            generation: GenerationSettings {
                temperature: config.generation.temperature,
                top_p: config.generation.top_p,
                max_output_tokens: config.generation.max_output_tokens,
                response_mime_type: RESPONSE_MIME_TYPE.to_string(),
            },
            safety: SafetySetting::block_none(),
            datastore,
        }
    }

    /// Build the request: the prompt first, then every image segment in order
    pub fn build_request(&self, prompt: String, image_parts: &[Part]) -> GenerateRequest {
        let mut parts = Vec::with_capacity(image_parts.len() + 1);
        parts.push(Part::Text(prompt));
        parts.extend_from_slice(image_parts);

        GenerateRequest {
            parts,
            generation: self.generation.clone(),
            safety: self.safety.clone(),
            retrieval_datastore: self.datastore.clone(),
        }
    }

    /// Call the model and return the first candidate's text
    pub async fn invoke(&self, prompt: String, image_parts: &[Part]) -> Result<String> {
        let request = self.build_request(prompt, image_parts);

        tracing::info!(
            model = %self.model.model_name(),
            parts = request.parts.len(),
            "Calling grading model"
        );

        let response = self.model.generate(&request).await?;

        match response.first_candidate_text() {
            Some(text) => {
                tracing::debug!(chars = text.chars().count(), "Model responded");
                Ok(text)
            }
            None => {
                let reason = response.block_reason();
                tracing::warn!(reason = %reason, "Model returned no candidates");
                Err(AppError::EmptyResponse { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateResponse, PromptFeedback, ScriptedModel};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.gcp.project_id = "demo".into();
        config.gcp.datastore_id = "answers".into();
        config
    }

    #[tokio::test]
    async fn test_prompt_comes_first() {
        let model = Arc::new(ScriptedModel::new().reply(r#"{"ok":true}"#));
        let client = GradingClient::new(model.clone(), &config());

        let images = vec![Part::text("lead-in"), Part::image("image/png", vec![9])];
        let text = client.invoke("PROMPT".into(), &images).await.unwrap();
        assert_eq!(text, r#"{"ok":true}"#);

        let requests = model.requests();
        let request = &requests[0];
        assert_eq!(request.parts[0], Part::text("PROMPT"));
        assert_eq!(&request.parts[1..], images.as_slice());
        assert_eq!(request.generation.response_mime_type, RESPONSE_MIME_TYPE);
        assert_eq!(request.generation.temperature, 0.1);
        assert!(request
            .retrieval_datastore
            .as_deref()
            .unwrap()
            .ends_with("/dataStores/answers"));
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let blocked = GenerateResponse {
            candidates: vec![],
            prompt_feedback: Some(PromptFeedback {
                block_reason: Some("SAFETY".into()),
                block_reason_message: None,
            }),
        };
        let client = GradingClient::new(Arc::new(ScriptedModel::new().respond(blocked)), &config());

        match client.invoke("p".into(), &[]).await.unwrap_err() {
            AppError::EmptyResponse { reason } => assert!(reason.contains("SAFETY")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let client = GradingClient::new(Arc::new(ScriptedModel::new().fail("429 quota")), &config());
        let err = client.invoke("p".into(), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::ModelCall { .. }));
    }

    #[test]
    fn test_no_datastore_no_tool() {
        let client = GradingClient::new(Arc::new(ScriptedModel::new()), &AppConfig::default());
        assert!(client.build_request("p".into(), &[]).retrieval_datastore.is_none());
    }
}
