//! Blob storage abstraction
//!
//! Bucket + path in, existence check, UTF-8 text out. Prompt templates and
//! answer-key documents both use this contract.

use crate::auth::TokenSource;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for reading text objects from a bucket
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether the object exists
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool>;

    /// Download the object as UTF-8 text
    async fn read_text(&self, bucket: &str, path: &str) -> Result<String>;

    /// Download the object if it exists
    async fn fetch_text(&self, bucket: &str, path: &str) -> Result<Option<String>> {
        if !self.exists(bucket, path).await? {
            return Ok(None);
        }
        self.read_text(bucket, path).await.map(Some)
    }
}

/// Google Cloud Storage JSON API client
pub struct GcsStore {
    client: reqwest::Client,
    tokens: Arc<TokenSource>,
    base_url: String,
}

impl GcsStore {
    pub fn new(client: reqwest::Client, tokens: Arc<TokenSource>, base_url: String) -> Self {
        Self {
            client,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            encode_component(bucket),
            encode_component(path)
        )
    }

    async fn get(&self, url: &str, media: bool) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        let mut request = self.client.get(url).bearer_auth(token);
        if media {
            request = request.query(&[("alt", "media")]);
        }
        request.send().await.map_err(|e| AppError::Storage {
            message: format!("Request failed: {}", e),
        })
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        let response = self.get(&self.object_url(bucket, path), false).await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                message: format!("gs://{}/{} metadata error {}: {}", bucket, path, status, body),
            });
        }
        Ok(true)
    }

    async fn read_text(&self, bucket: &str, path: &str) -> Result<String> {
        let response = self.get(&self.object_url(bucket, path), true).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                message: format!("gs://{}/{} download error {}: {}", bucket, path, status, body),
            });
        }

        let bytes = response.bytes().await.map_err(|e| AppError::Storage {
            message: format!("Failed to read gs://{}/{}: {}", bucket, path, e),
        })?;

        String::from_utf8(bytes.to_vec()).map_err(|_| AppError::Storage {
            message: format!("gs://{}/{} is not valid UTF-8", bucket, path),
        })
    }
}

/// Percent-encode one path segment of a GCS object URL
fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// In-memory store for testing
#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: &str, path: &str, text: &str) -> Self {
        self.objects
            .insert((bucket.to_string(), path.to_string()), text.to_string());
        self
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool> {
        Ok(self
            .objects
            .contains_key(&(bucket.to_string(), path.to_string())))
    }

    async fn read_text(&self, bucket: &str, path: &str) -> Result<String> {
        self.objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| AppError::Storage {
                message: format!("gs://{}/{} not found", bucket, path),
            })
    }
}
