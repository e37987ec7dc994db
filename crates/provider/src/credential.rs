//! Cached access token for the geodata backend.
//!
//! Tokens come from a client-credentials grant and live in a
//! [`KeyValueStore`] until [`TOKEN_EXPIRY_MARGIN`] before their nominal
//! expiry. Concurrent misses may each fetch a token; the last `set` wins.

use crate::http::HttpTransport;
use async_trait::async_trait;
use geofence_core::config::AuthConfig;
use geofence_core::error::{GeofenceError, GeofenceResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

/// A token is never presented within this window of its expiry.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// TTL-aware key-value store. Local or shared.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> GeofenceResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> GeofenceResult<()>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// In-process store. Expired entries read as absent.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> GeofenceResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| Instant::now() < stored.expires_at)
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> GeofenceResult<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, stored| now < stored.expires_at);
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// How long a token with the given lifetime may be cached, if at all.
pub fn cache_ttl(expires_in: Duration) -> Option<Duration> {
    expires_in
        .checked_sub(TOKEN_EXPIRY_MARGIN)
        .filter(|ttl| !ttl.is_zero())
}

pub struct CredentialCache {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn KeyValueStore>,
    auth: AuthConfig,
}

impl CredentialCache {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            transport,
            store,
            auth,
        }
    }

    /// Returns a cached token, or fetches and caches a new one.
    pub async fn get_token(&self) -> GeofenceResult<String> {
        match self.store.get(&self.auth.cache_key).await {
            Ok(Some(token)) => {
                tracing::debug!("using cached token");
                return Ok(token);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "token cache read failed, refreshing"),
        }

        let (token, expires_in) = self.request_token().await?;

        match cache_ttl(expires_in) {
            Some(ttl) => {
                if let Err(e) = self.store.set(&self.auth.cache_key, &token, ttl).await {
                    tracing::warn!(error = %e, "token cache write failed");
                }
                tracing::info!(ttl_secs = ttl.as_secs(), "fetched new token");
            }
            None => tracing::warn!(
                expires_in_secs = expires_in.as_secs(),
                "token lifetime inside expiry margin, not caching"
            ),
        }

        Ok(token)
    }

    async fn request_token(&self) -> GeofenceResult<(String, Duration)> {
        let url = Url::parse(&self.auth.token_url)
            .map_err(|e| GeofenceError::Auth(format!("Invalid token URL: {e}")))?;
        let form = vec![
            ("client_id".to_string(), self.auth.client_id.clone()),
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_secret".to_string(), self.auth.client_secret.clone()),
        ];

        let body = self
            .transport
            .post_form(url, form)
            .await
            .map_err(|e| GeofenceError::Auth(format!("Token request failed: {e}")))?;

        let response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GeofenceError::Auth(format!("Malformed token response: {e}")))?;

        if let Some(error) = response.error {
            return Err(GeofenceError::Auth(format!("Token endpoint error: {error}")));
        }

        let lifetime = response
            .expires_in
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        match (response.access_token, lifetime) {
            (Some(token), Some(lifetime)) if !token.is_empty() => Ok((token, lifetime)),
            _ => Err(GeofenceError::Auth(
                "Token response missing access_token or expires_in".into(),
            )),
        }
    }
}
