//! Bearer token source for Google Cloud REST calls
//!
//! A statically configured token is used as-is. Otherwise tokens come from
//! the instance metadata server (GCE, Cloud Run) and are cached until shortly
//! before they expire.

use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the reported expiry
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Metadata-server token and when to refresh it
pub struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Where access tokens come from
pub enum TokenSource {
    Static(String),
    Metadata {
        client: reqwest::Client,
        url: String,
        cache: RwLock<Option<CachedToken>>,
    },
}

impl TokenSource {
    /// Use the configured token when present, else the metadata server
    pub fn from_config(client: reqwest::Client, access_token: Option<String>) -> Self {
        match access_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => TokenSource::Static(token),
            None => Self::metadata(client, METADATA_TOKEN_URL.to_string()),
        }
    }

    pub fn metadata(client: reqwest::Client, url: String) -> Self {
        TokenSource::Metadata {
            client,
            url,
            cache: RwLock::new(None),
        }
    }

    /// Current access token
    pub async fn token(&self) -> Result<String> {
        let (client, url, cache) = match self {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { client, url, cache } => (client, url, cache),
        };

        if let Some(cached) = cache.read().await.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        let mut guard = cache.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        let response = client
            .get(url.as_str())
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::Auth {
                message: format!("Metadata server unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth {
                message: format!("Metadata server error {}: {}", status, body),
            });
        }

        let token: MetadataToken = response.json().await.map_err(|e| AppError::Auth {
            message: format!("Failed to parse token response: {}", e),
        })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(expires_in = token.expires_in, "Fetched access token from metadata server");

        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        let source = TokenSource::from_config(reqwest::Client::new(), Some("ya29.test".into()));
        assert_eq!(tokio_test::block_on(source.token()).unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_blank_token_falls_back_to_metadata() {
        let source = TokenSource::from_config(reqwest::Client::new(), Some("  ".into()));
        assert!(matches!(source, TokenSource::Metadata { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_metadata_is_auth_error() {
        let source = TokenSource::metadata(
            reqwest::Client::new(),
            "http://127.0.0.1:9/token".to_string(),
        );
        let err = source.token().await.unwrap_err();
        assert!(matches!(err, AppError::Auth { .. }));
    }
}
