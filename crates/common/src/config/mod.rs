//! Configuration management for Tutorgrade services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - The flat variable names used by earlier deployments
//!   (GCP_PROJECT_ID, GEMINI_MODEL_NAME, ...)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Google Cloud project, model, datastore, and bucket settings
    pub gcp: GcpConfig,

    /// Object prefixes inside the prompt bucket
    #[serde(default)]
    pub storage_layout: StorageLayoutConfig,

    /// Decoding parameters for the grading model
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Upload limits
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GcpConfig {
    /// Project that owns the model, datastore, and bucket
    #[serde(default)]
    pub project_id: String,

    /// Vertex AI location for the model endpoint
    #[serde(default = "default_location")]
    pub location: String,

    /// Generative model name, e.g. gemini-2.0-flash
    #[serde(default)]
    pub model_name: String,

    /// Vertex AI Search datastore used as the grounding tool
    #[serde(default)]
    pub datastore_id: String,

    /// Collection location of the datastore
    #[serde(default = "default_location")]
    pub datastore_location: String,

    /// Bucket holding prompt templates and answer keys
    #[serde(default)]
    pub prompt_bucket: String,

    /// Static bearer token; when absent the metadata server is used
    pub access_token: Option<String>,

    /// Override for the Vision API base URL
    #[serde(default = "default_vision_endpoint")]
    pub vision_endpoint: String,

    /// Override for the Cloud Storage base URL
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// Override for the Vertex AI base URL (derived from location when absent)
    pub vertex_endpoint: Option<String>,

    /// Outbound HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageLayoutConfig {
    /// Folder holding `{submission type}.txt` templates
    #[serde(default = "default_prompt_prefix")]
    pub prompt_prefix: String,

    /// Folder holding answer-key JSON documents
    #[serde(default = "default_answer_prefix")]
    pub answer_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Per-file size limit in megabytes
    #[serde(default = "default_max_image_mb")]
    pub max_image_mb: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (debug, info, warn, error, or an EnvFilter string)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name reported at startup
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second across the process
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default)]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_body_limit_mb() -> usize { 100 }
fn default_location() -> String { "global".to_string() }
fn default_vision_endpoint() -> String { "https://vision.googleapis.com/v1".to_string() }
fn default_storage_endpoint() -> String { "https://storage.googleapis.com".to_string() }
fn default_http_timeout() -> u64 { 240 }
fn default_prompt_prefix() -> String { "ai_english_prompt/".to_string() }
fn default_answer_prefix() -> String { "ai_english_file/".to_string() }
fn default_temperature() -> f32 { 0.1 }
fn default_top_p() -> f32 { 0.5 }
fn default_max_output_tokens() -> u32 { 8192 }
fn default_max_image_mb() -> usize { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "tutorgrade".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }

/// Flat environment names kept from earlier deployments, mapped to
/// their nested keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("GCP_PROJECT_ID", "gcp.project_id"),
    ("GCP_LOCATION", "gcp.location"),
    ("GEMINI_MODEL_NAME", "gcp.model_name"),
    ("DATASTORE_ID", "gcp.datastore_id"),
    ("GCS_PROMPT_BUCKET_NAME", "gcp.prompt_bucket"),
    ("GCP_ACCESS_TOKEN", "gcp.access_token"),
    ("PORT", "server.port"),
];

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = Config::builder()
            // Start with defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("gcp.location", default_location())?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__GCP__MODEL_NAME=gemini-2.0-flash
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            );

        for (var, key) in LEGACY_ENV_KEYS {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        builder.build()?.try_deserialize()
    }

    /// Per-file upload limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.uploads.max_image_mb * 1024 * 1024
    }

    /// Names of required Google Cloud settings that are still empty
    pub fn missing_gcp_settings(&self) -> Vec<&'static str> {
        let gcp = &self.gcp;
        [
            ("project_id", gcp.project_id.is_empty()),
            ("model_name", gcp.model_name.is_empty()),
            ("datastore_id", gcp.datastore_id.is_empty()),
            ("prompt_bucket", gcp.prompt_bucket.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

impl GcpConfig {
    /// Full resource name of the grounding datastore
    pub fn datastore_resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/collections/default_collection/dataStores/{}",
            self.project_id, self.datastore_location, self.datastore_id
        )
    }

    /// Base URL of the Vertex AI API for the configured location
    pub fn vertex_base_url(&self) -> String {
        if let Some(endpoint) = &self.vertex_endpoint {
            return endpoint.trim_end_matches('/').to_string();
        }
        if self.location == "global" {
            "https://aiplatform.googleapis.com/v1".to_string()
        } else {
            format!("https://{}-aiplatform.googleapis.com/v1", self.location)
        }
    }

    /// Outbound HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for StorageLayoutConfig {
    fn default() -> Self {
        Self {
            prompt_prefix: default_prompt_prefix(),
            answer_prefix: default_answer_prefix(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_image_mb: default_max_image_mb() }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                body_limit_mb: default_body_limit_mb(),
            },
            gcp: GcpConfig {
                project_id: String::new(),
                location: default_location(),
                model_name: String::new(),
                datastore_id: String::new(),
                datastore_location: default_location(),
                prompt_bucket: String::new(),
                access_token: None,
                vision_endpoint: default_vision_endpoint(),
                storage_endpoint: default_storage_endpoint(),
                vertex_endpoint: None,
                http_timeout_secs: default_http_timeout(),
            },
            storage_layout: StorageLayoutConfig::default(),
            generation: GenerationConfig::default(),
            uploads: UploadConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.gcp.location, "global");
        assert_eq!(config.generation.max_output_tokens, 8192);
        assert_eq!(config.max_upload_bytes(), 20 * 1024 * 1024);
    }

    #[test]
    fn test_server_has_no_request_timeout() {
        let server = serde_json::to_value(AppConfig::default().server).unwrap();
        let keys: Vec<&str> = server.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["host", "port", "body_limit_mb"]);
        assert_eq!(AppConfig::default().gcp.http_timeout(), Duration::from_secs(240));
    }

    #[test]
    fn test_datastore_resource_name() {
        let mut config = AppConfig::default();
        config.gcp.project_id = "demo-project".into();
        config.gcp.datastore_id = "english-answers".into();
        assert_eq!(
            config.gcp.datastore_resource_name(),
            "projects/demo-project/locations/global/collections/default_collection/dataStores/english-answers"
        );
    }

    #[test]
    fn test_vertex_base_url() {
        let mut gcp = AppConfig::default().gcp;
        assert_eq!(gcp.vertex_base_url(), "https://aiplatform.googleapis.com/v1");

        gcp.location = "asia-east1".into();
        assert_eq!(gcp.vertex_base_url(), "https://asia-east1-aiplatform.googleapis.com/v1");

        gcp.vertex_endpoint = Some("http://localhost:9000/v1/".into());
        assert_eq!(gcp.vertex_base_url(), "http://localhost:9000/v1");
    }

    #[test]
    fn test_missing_gcp_settings() {
        let mut config = AppConfig::default();
        assert_eq!(config.missing_gcp_settings().len(), 4);

        config.gcp.project_id = "p".into();
        config.gcp.model_name = "m".into();
        config.gcp.datastore_id = "d".into();
        config.gcp.prompt_bucket = "b".into();
        assert!(config.missing_gcp_settings().is_empty());
    }
}
