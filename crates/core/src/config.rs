//! Static configuration for the geofence engine.
//!
//! Loaded once from a JSON document. Entity kinds (`asset`, `user`, ...)
//! are plain entries under `entities`; nothing in the engine is specific
//! to one kind.

use crate::error::{GeofenceError, GeofenceResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_TOKEN_URL: &str = "https://www.arcgis.com/sharing/rest/oauth2/token/";
pub const DEFAULT_TOKEN_CACHE_KEY: &str = "arcgisToken";
pub const DEFAULT_OBJECT_ID_FIELD: &str = "OBJECTID";
pub const DEFAULT_MEMBERSHIP_FIELD: &str = "LastKnownGeofences";
pub const DEFAULT_PUBNUB_ORIGIN: &str = "https://ps.pndsn.com";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceConfig {
    pub auth: AuthConfig,
    pub regions: RegionStoreConfig,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityStoreConfig>,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Client-credentials grant against the token endpoint.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    /// JSON file the token is persisted in between runs. In-memory when unset.
    #[serde(default)]
    pub token_cache: Option<PathBuf>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("cache_key", &self.cache_key)
            .field("token_cache", &self.token_cache)
            .finish()
    }
}

/// Geofence polygon layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStoreConfig {
    pub endpoint: String,
    #[serde(default = "default_object_id_field")]
    pub id_field: String,
}

/// Per-kind entity layer, as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStoreConfig {
    pub endpoint: String,
    /// Inbound message key carrying the entity id. Defaults to the kind name.
    #[serde(default)]
    pub message_field: Option<String>,
    #[serde(default = "default_object_id_field")]
    pub id_field: String,
    #[serde(default = "default_object_id_field")]
    pub record_id_field: String,
    #[serde(default = "default_membership_field")]
    pub membership_field: String,
    /// Defaults to the kind name.
    #[serde(default)]
    pub channel_prefix: Option<String>,
    /// Treat a zero-match membership lookup as a new entity instead of an error.
    #[serde(default)]
    pub create_missing: bool,
}

/// Fully resolved entity kind. This is what the engine is parameterized by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKind {
    pub name: String,
    pub endpoint: String,
    pub message_field: String,
    pub id_field: String,
    pub record_id_field: String,
    pub membership_field: String,
    pub channel_prefix: String,
    pub create_missing: bool,
}

impl EntityKind {
    /// Kind with stock field names, keyed by `name` everywhere.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            endpoint: endpoint.into(),
            message_field: name.clone(),
            id_field: DEFAULT_OBJECT_ID_FIELD.into(),
            record_id_field: DEFAULT_OBJECT_ID_FIELD.into(),
            membership_field: DEFAULT_MEMBERSHIP_FIELD.into(),
            channel_prefix: name.clone(),
            create_missing: false,
            name,
        }
    }

    pub fn asset(endpoint: impl Into<String>) -> Self {
        Self::new("asset", endpoint)
    }

    pub fn user(endpoint: impl Into<String>) -> Self {
        Self::new("user", endpoint)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    #[serde(default = "enabled")]
    pub entry: bool,
    #[serde(default = "enabled")]
    pub exit: bool,
    #[serde(default = "enabled")]
    pub location: bool,
    #[serde(default)]
    pub pubnub: Option<PubNubConfig>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            entry: true,
            exit: true,
            location: true,
            pubnub: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubNubConfig {
    pub publish_key: String,
    pub subscribe_key: String,
    #[serde(default = "default_pubnub_origin")]
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl GeofenceConfig {
    pub fn from_json(json: &str) -> GeofenceResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GeofenceError::Config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> GeofenceResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GeofenceError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> GeofenceResult<()> {
        require_url("auth.tokenUrl", &self.auth.token_url)?;
        require("auth.cacheKey", &self.auth.cache_key)?;
        require_url("regions.endpoint", &self.regions.endpoint)?;
        require("regions.idField", &self.regions.id_field)?;

        if self.entities.is_empty() {
            return Err(GeofenceError::Config(
                "At least one entity kind must be configured".into(),
            ));
        }
        for (name, entity) in &self.entities {
            require_url(&format!("entities.{name}.endpoint"), &entity.endpoint)?;
            require(&format!("entities.{name}.idField"), &entity.id_field)?;
            require(
                &format!("entities.{name}.recordIdField"),
                &entity.record_id_field,
            )?;
            require(
                &format!("entities.{name}.membershipField"),
                &entity.membership_field,
            )?;
        }
        if let Some(pubnub) = &self.publish.pubnub {
            require_url("publish.pubnub.origin", &pubnub.origin)?;
            require("publish.pubnub.publishKey", &pubnub.publish_key)?;
            require("publish.pubnub.subscribeKey", &pubnub.subscribe_key)?;
        }
        Ok(())
    }

    /// Resolves a configured kind, filling defaults derived from its name.
    pub fn entity_kind(&self, name: &str) -> GeofenceResult<EntityKind> {
        let entity = self.entities.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.entities.keys().map(String::as_str).collect();
            GeofenceError::Config(format!(
                "Unknown entity kind '{name}' (configured: {})",
                known.join(", ")
            ))
        })?;

        Ok(EntityKind {
            name: name.to_string(),
            endpoint: entity.endpoint.clone(),
            message_field: entity
                .message_field
                .clone()
                .unwrap_or_else(|| name.to_string()),
            id_field: entity.id_field.clone(),
            record_id_field: entity.record_id_field.clone(),
            membership_field: entity.membership_field.clone(),
            channel_prefix: entity
                .channel_prefix
                .clone()
                .unwrap_or_else(|| name.to_string()),
            create_missing: entity.create_missing,
        })
    }
}

fn require(field: &str, value: &str) -> GeofenceResult<()> {
    if value.trim().is_empty() {
        return Err(GeofenceError::Config(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Non-empty and an absolute http(s) URL.
fn require_url(field: &str, value: &str) -> GeofenceResult<()> {
    require(field, value)?;
    let url = Url::parse(value)
        .map_err(|e| GeofenceError::Config(format!("{field} is not a valid URL ({value}): {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(GeofenceError::Config(format!(
            "{field} must be an http(s) URL, got {value}"
        )));
    }
    Ok(())
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.into()
}

fn default_cache_key() -> String {
    DEFAULT_TOKEN_CACHE_KEY.into()
}

fn default_object_id_field() -> String {
    DEFAULT_OBJECT_ID_FIELD.into()
}

fn default_membership_field() -> String {
    DEFAULT_MEMBERSHIP_FIELD.into()
}

fn default_pubnub_origin() -> String {
    DEFAULT_PUBNUB_ORIGIN.into()
}

fn default_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn enabled() -> bool {
    true
}
