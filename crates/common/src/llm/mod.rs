//! Generative model abstraction
//!
//! Ordered text/image segments, generation config, safety thresholds, and a
//! retrieval tool go in; zero-or-more candidates with text parts come out.
//! The production client calls Vertex AI `generateContent`.

use crate::auth::TokenSource;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One segment of the model input
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn image(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Decoding parameters
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
}

/// Block threshold for one harm category
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

impl SafetySetting {
    /// Disable blocking for every harm category the model reports on
    pub fn block_none() -> Vec<SafetySetting> {
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| SafetySetting {
            category: category.to_string(),
            threshold: "BLOCK_NONE".to_string(),
        })
        .collect()
    }
}

/// A complete model call
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub parts: Vec<Part>,
    pub generation: GenerationSettings,
    pub safety: Vec<SafetySetting>,
    /// Vertex AI Search datastore resource used for grounding
    pub retrieval_datastore: Option<String>,
}

/// Model response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
    pub block_reason_message: Option<String>,
}

impl GenerateResponse {
    /// Response with a single candidate holding the given text parts
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GenerateResponse {
            candidates: vec![Candidate {
                content: Some(CandidateContent {
                    parts: texts
                        .into_iter()
                        .map(|t| ResponsePart { text: Some(t.into()) })
                        .collect(),
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        }
    }

    /// Concatenation of every text part of the first candidate
    pub fn first_candidate_text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let parts = candidate
            .content
            .as_ref()
            .map(|c| c.parts.as_slice())
            .unwrap_or_default();
        Some(parts.iter().filter_map(|p| p.text.as_deref()).collect())
    }

    /// Human-readable reason for a response without candidates
    pub fn block_reason(&self) -> String {
        match &self.prompt_feedback {
            Some(PromptFeedback { block_reason: Some(reason), block_reason_message, .. }) => {
                match block_reason_message {
                    Some(message) => format!("Blocked due to: {} ({})", reason, message),
                    None => format!("Blocked due to: {}", reason),
                }
            }
            Some(_) => "Prompt feedback without block reason".to_string(),
            None => "No prompt_feedback attribute".to_string(),
        }
    }
}

/// Trait for generative model backends
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Run one generation call. Transport, quota, and HTTP errors surface as
    /// `AppError::ModelCall`; an empty candidate list is returned as-is.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

// Wire types for the Vertex AI REST API

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexRequest<'a> {
    contents: Vec<VertexContent>,
    generation_config: &'a GenerationSettings,
    safety_settings: &'a [SafetySetting],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<VertexTool>,
}

#[derive(Serialize)]
struct VertexContent {
    role: &'static str,
    parts: Vec<VertexPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<VertexBlob>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexBlob {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct VertexTool {
    retrieval: VertexRetrieval,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VertexRetrieval {
    vertex_ai_search: VertexAiSearch,
}

#[derive(Serialize)]
struct VertexAiSearch {
    datastore: String,
}

impl<'a> VertexRequest<'a> {
    fn from_request(request: &'a GenerateRequest) -> Self {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => VertexPart {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                Part::InlineData { mime_type, data } => VertexPart {
                    text: None,
                    inline_data: Some(VertexBlob {
                        mime_type: mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(data),
                    }),
                },
            })
            .collect();

        let tools = request
            .retrieval_datastore
            .iter()
            .map(|datastore| VertexTool {
                retrieval: VertexRetrieval {
                    vertex_ai_search: VertexAiSearch {
                        datastore: datastore.clone(),
                    },
                },
            })
            .collect();

        Self {
            contents: vec![VertexContent { role: "user", parts }],
            generation_config: &request.generation,
            safety_settings: &request.safety,
            tools,
        }
    }
}

/// Vertex AI Gemini client
pub struct VertexGemini {
    client: reqwest::Client,
    tokens: Arc<TokenSource>,
    endpoint: String,
    model: String,
}

impl VertexGemini {
    /// `base_url` is the versioned API root, e.g. `https://aiplatform.googleapis.com/v1`
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<TokenSource>,
        base_url: &str,
        project_id: &str,
        location: &str,
        model: String,
    ) -> Self {
        let endpoint = format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            project_id,
            location,
            model
        );
        Self {
            client,
            tokens,
            endpoint,
            model,
        }
    }

    async fn make_request(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let body = VertexRequest::from_request(request);
        let token = self.tokens.token().await.map_err(|e| AppError::ModelCall {
            details: e.to_string(),
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ModelCall {
                details: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelCall {
                details: format!("API error {}: {}", status, body),
            });
        }

        response.json().await.map_err(|e| AppError::ModelCall {
            details: format!("Failed to parse response: {}", e),
        })
    }
}

#[async_trait]
impl GenerativeModel for VertexGemini {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let start = Instant::now();
        let result = self.make_request(request).await;

        let status = match &result {
            Ok(response) if response.candidates.is_empty() => "empty",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        metrics::record_model_call(start.elapsed().as_secs_f64(), &self.model, status);

        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted model for testing.
///
/// Replays queued outcomes in order and keeps every request it receives.
#[derive(Default)]
pub struct ScriptedModel {
    outcomes: Mutex<VecDeque<std::result::Result<GenerateResponse, String>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    latency: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response whose first candidate carries `text`
    pub fn reply(self, text: &str) -> Self {
        self.respond(GenerateResponse::from_texts([text]))
    }

    pub fn respond(self, response: GenerateResponse) -> Self {
        self.push(Ok(response))
    }

    /// Queue a transport failure
    pub fn fail(self, details: &str) -> Self {
        self.push(Err(details.to_string()))
    }

    /// Wait this long before every reply
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(self, outcome: std::result::Result<GenerateResponse, String>) -> Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.outcomes.lock().ok().and_then(|mut o| o.pop_front());
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(details)) => Err(AppError::ModelCall { details }),
            None => Err(AppError::ModelCall {
                details: "No scripted response left".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}
