//! Fire-and-forget notification dispatch.
//!
//! Each publish is spawned onto the runtime and never awaited by the
//! update flow; failures surface only in the logs. Finished tasks are reaped
//! on the next dispatch, so a long-lived emitter holds only what is still
//! running. [`NotificationEmitter::flush`] joins whatever is still in flight,
//! for hosts that exit after one update.

use crate::sink::{EventKind, Notification, Publisher};
use geofence_core::config::PublishConfig;
use geofence_core::types::{Coordinates, EntityId, RegionSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Static per-event enable switches. All on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishFlags {
    pub entry: bool,
    pub exit: bool,
    pub location: bool,
}

impl Default for PublishFlags {
    fn default() -> Self {
        Self {
            entry: true,
            exit: true,
            location: true,
        }
    }
}

impl From<&PublishConfig> for PublishFlags {
    fn from(config: &PublishConfig) -> Self {
        Self {
            entry: config.entry,
            exit: config.exit,
            location: config.location,
        }
    }
}

pub struct NotificationEmitter {
    publisher: Arc<dyn Publisher>,
    flags: PublishFlags,
    channel_prefix: String,
    in_flight: Mutex<JoinSet<()>>,
}

impl NotificationEmitter {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        flags: PublishFlags,
        channel_prefix: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            flags,
            channel_prefix: channel_prefix.into(),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Returns whether a publish was dispatched.
    pub fn publish_location(&self, entity: &EntityId, position: Coordinates) -> bool {
        if !self.flags.location {
            return false;
        }
        self.dispatch(Notification::location(&self.channel_prefix, entity, position))
    }

    /// No-op for an empty set.
    pub fn publish_entered(&self, entity: &EntityId, regions: &RegionSet) -> bool {
        if !self.flags.entry || regions.is_empty() {
            return false;
        }
        tracing::info!(entity = %entity, regions = %regions, "entered region(s)");
        self.dispatch(Notification::regions(
            EventKind::Entered,
            &self.channel_prefix,
            entity,
            regions,
        ))
    }

    /// No-op for an empty set.
    pub fn publish_exited(&self, entity: &EntityId, regions: &RegionSet) -> bool {
        if !self.flags.exit || regions.is_empty() {
            return false;
        }
        tracing::info!(entity = %entity, regions = %regions, "exited region(s)");
        self.dispatch(Notification::regions(
            EventKind::Exited,
            &self.channel_prefix,
            entity,
            regions,
        ))
    }

    /// Waits for every dispatched publish to finish.
    pub async fn flush(&self) {
        let mut pending = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *in_flight, JoinSet::new())
        };
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "publish task panicked");
            }
        }
    }

    fn dispatch(&self, notification: Notification) -> bool {
        let publisher = Arc::clone(&self.publisher);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "publish task panicked");
            }
        }
        in_flight.spawn(async move {
            match publisher.publish(&notification).await {
                Ok(()) => tracing::debug!(channel = %notification.channel, "notification published"),
                Err(e) => {
                    tracing::warn!(channel = %notification.channel, error = %e, "notification publish failed")
                }
            }
        });
        true
    }
}
