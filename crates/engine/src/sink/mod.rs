//! Notification sinks.
//!
//! Every event is a [`Notification`]: a channel name plus a small JSON
//! message. Two backends:
//! - **NDJSON stream**: one `{channel, message}` line per event to any `Write` impl
//! - **PubNub REST publish**: GET to the publish endpoint through the backend transport

pub mod json_stream;
pub mod pubnub;

use async_trait::async_trait;
use geofence_core::error::GeofenceResult;
use geofence_core::types::{Coordinates, EntityId, RegionSet};
use serde::Serialize;
use serde_json::{json, Value};

/// The three event kinds an update can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LocationUpdate,
    Entered,
    Exited,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocationUpdate => "locationUpdate",
            Self::Entered => "entered",
            Self::Exited => "exited",
        }
    }

    /// Suffix after a kind prefix. Location keeps the established
    /// `assetLocation+<id>` channel name.
    fn prefixed(self) -> &'static str {
        match self {
            Self::LocationUpdate => "Location",
            Self::Entered => "Entered",
            Self::Exited => "Exited",
        }
    }

    /// `<prefix><Kind>+<entity>`; with no prefix the bare kind is used
    /// (`entered+E1` vs `assetEntered+E1`, `locationUpdate+E1` vs `assetLocation+E1`).
    pub fn channel(self, prefix: &str, entity: &EntityId) -> String {
        if prefix.is_empty() {
            return format!("{}+{entity}", self.as_str());
        }
        format!("{prefix}{}+{entity}", self.prefixed())
    }
}

/// One outbound event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub channel: String,
    pub message: Value,
}

impl Notification {
    pub fn location(prefix: &str, entity: &EntityId, position: Coordinates) -> Self {
        Self {
            channel: EventKind::LocationUpdate.channel(prefix, entity),
            message: json!({
                "entityId": entity.as_str(),
                "lat": position.lat,
                "lng": position.lng,
            }),
        }
    }

    /// Entered or exited event. `kind` must not be `LocationUpdate`.
    pub fn regions(kind: EventKind, prefix: &str, entity: &EntityId, regions: &RegionSet) -> Self {
        debug_assert_ne!(kind, EventKind::LocationUpdate);
        Self {
            channel: kind.channel(prefix, entity),
            message: json!({
                "entityId": entity.as_str(),
                "regions": regions.to_vec(),
            }),
        }
    }
}

/// Destination for notifications. Failures are reported, never retried.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, notification: &Notification) -> GeofenceResult<()>;
}
