//! PubNub REST publish sink.
//!
//! `GET {origin}/publish/{pub_key}/{sub_key}/0/{channel}/0/{message}`;
//! the service answers `[1, "Sent", "<timetoken>"]` on success.

use super::{Notification, Publisher};
use async_trait::async_trait;
use geofence_core::config::PubNubConfig;
use geofence_core::error::{GeofenceError, GeofenceResult};
use geofence_provider::HttpTransport;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

pub struct PubNubPublisher {
    transport: Arc<dyn HttpTransport>,
    config: PubNubConfig,
}

impl PubNubPublisher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: PubNubConfig) -> Self {
        Self { transport, config }
    }

    fn publish_url(&self, notification: &Notification) -> GeofenceResult<Url> {
        let message = serde_json::to_string(&notification.message)
            .map_err(|e| GeofenceError::Publish(format!("Failed to encode message: {e}")))?;
        let mut url = Url::parse(&self.config.origin)
            .map_err(|e| GeofenceError::Config(format!("Invalid PubNub origin: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GeofenceError::Config("PubNub origin cannot be a base URL".into()))?
            .pop_if_empty()
            .extend([
                "publish",
                self.config.publish_key.as_str(),
                self.config.subscribe_key.as_str(),
                "0",
                notification.channel.as_str(),
                "0",
                message.as_str(),
            ]);
        Ok(url)
    }
}

#[async_trait]
impl Publisher for PubNubPublisher {
    async fn publish(&self, notification: &Notification) -> GeofenceResult<()> {
        let url = self.publish_url(notification)?;
        let body = self.transport.get(url).await.map_err(|e| {
            GeofenceError::Publish(format!("Publish to {} failed: {e}", notification.channel))
        })?;

        let reply: Value = serde_json::from_str(&body)
            .map_err(|e| GeofenceError::Publish(format!("Malformed publish reply: {e}")))?;
        match reply.get(0).and_then(Value::as_i64) {
            Some(1) => {
                tracing::debug!(channel = %notification.channel, timetoken = %reply[2], "published");
                Ok(())
            }
            _ => Err(GeofenceError::Publish(format!(
                "Publish to {} rejected: {}",
                notification.channel, reply[1]
            ))),
        }
    }
}
