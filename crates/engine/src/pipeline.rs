//! Location-update pipeline.
//!
//! ```text
//! Validating -> TokenAcquiring -> Fetching -> Diffing -> Writing -> Done
//! ```
//!
//! Any stage may abort; the error's [`GeofenceError::abort_reason`] is what
//! the caller sees. Nothing is retried here. Each stage hands an explicit
//! value to the next; the engine itself holds no per-update state.

use crate::emitter::{NotificationEmitter, PublishFlags};
use crate::sink::Publisher;
use geofence_core::config::{EntityKind, GeofenceConfig, RegionStoreConfig};
use geofence_core::error::{GeofenceError, GeofenceResult};
use geofence_core::types::{LocationUpdate, Membership, RegionSet, WriteAction};
use geofence_core::{EntityId, Transition};
use geofence_provider::{
    CredentialCache, HttpTransport, MembershipWriter, RegionQueryService, WriteReceipt,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    TokenAcquiring,
    Fetching,
    Diffing,
    Writing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::TokenAcquiring => "token_acquiring",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Writing => "writing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Both membership snapshots for one update.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshots {
    pub previous: Membership,
    pub current: RegionSet,
}

/// Acknowledgment returned for a completed update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub entity: EntityId,
    pub kind: String,
    pub regions: RegionSet,
    pub entered: RegionSet,
    pub exited: RegionSet,
    pub action: WriteAction,
    pub record_id: Option<i64>,
}

/// Transition engine for one entity kind.
pub struct GeofenceEngine {
    kind: EntityKind,
    credentials: Arc<CredentialCache>,
    regions: RegionQueryService,
    writer: MembershipWriter,
    emitter: NotificationEmitter,
}

impl GeofenceEngine {
    /// The credential cache may be shared between engines of different kinds.
    pub fn new(
        kind: EntityKind,
        region_store: RegionStoreConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialCache>,
        emitter: NotificationEmitter,
    ) -> Self {
        Self {
            regions: RegionQueryService::new(transport.clone(), region_store, kind.clone()),
            writer: MembershipWriter::new(transport, kind.clone()),
            kind,
            credentials,
            emitter,
        }
    }

    /// Wires an engine for the configured kind `kind_name`.
    pub fn from_config(
        config: &GeofenceConfig,
        kind_name: &str,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialCache>,
        publisher: Arc<dyn Publisher>,
    ) -> GeofenceResult<Self> {
        let kind = config.entity_kind(kind_name)?;
        let emitter = NotificationEmitter::new(
            publisher,
            PublishFlags::from(&config.publish),
            kind.channel_prefix.clone(),
        );
        Ok(Self::new(
            kind,
            config.regions.clone(),
            transport,
            credentials,
            emitter,
        ))
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Handles a raw inbound message (`{"<kind>": id, "lat": .., "lng": ..}`).
    pub async fn handle_message(&self, message: &Value) -> GeofenceResult<UpdateOutcome> {
        let update = LocationUpdate::from_message(message, &self.kind.message_field)
            .map_err(|e| self.abort(Stage::Validating, None, e))?;
        self.process(update).await
    }

    /// Runs one validated update through every stage.
    pub async fn process(&self, update: LocationUpdate) -> GeofenceResult<UpdateOutcome> {
        let entity = &update.entity;
        tracing::info!(
            entity = %entity,
            kind = %self.kind.name,
            lat = update.position.lat,
            lng = update.position.lng,
            "location update"
        );

        self.emitter.publish_location(entity, update.position);

        let token = self
            .credentials
            .get_token()
            .await
            .map_err(|e| self.abort(Stage::TokenAcquiring, Some(entity), e))?;

        let snapshots = self.fetch(&update, &token).await?;

        tracing::debug!(entity = %entity, stage = %Stage::Diffing, "computing transition");
        let transition = Transition::between(&snapshots.previous.regions, &snapshots.current);
        self.emitter.publish_entered(entity, &transition.entered);
        self.emitter.publish_exited(entity, &transition.exited);

        let receipt = self
            .write(&update, &snapshots, &token)
            .await
            .map_err(|e| self.abort(Stage::Writing, Some(entity), e))?;

        tracing::info!(
            entity = %entity,
            stage = %Stage::Done,
            entered = %transition.entered,
            exited = %transition.exited,
            record_id = ?receipt.record_id,
            "update complete"
        );

        Ok(UpdateOutcome {
            entity: update.entity.clone(),
            kind: self.kind.name.clone(),
            regions: snapshots.current,
            entered: transition.entered,
            exited: transition.exited,
            action: receipt.action,
            record_id: receipt.record_id,
        })
    }

    /// Waits for in-flight notifications.
    pub async fn flush(&self) {
        self.emitter.flush().await;
    }

    /// Both reads are in flight at once; either failure aborts the update.
    async fn fetch(&self, update: &LocationUpdate, token: &str) -> GeofenceResult<Snapshots> {
        let entity = &update.entity;
        tracing::debug!(entity = %entity, stage = %Stage::Fetching, "fetching memberships");

        let (previous, current) = tokio::join!(
            self.regions.last_known_membership(entity, token),
            self.regions.regions_containing(update.position, token),
        );

        match (previous, current) {
            (Ok(previous), Ok(current)) => Ok(Snapshots { previous, current }),
            (Err(e), current) => {
                if let Err(other) = current {
                    tracing::warn!(entity = %entity, error = %other, "region lookup also failed");
                }
                Err(self.abort(Stage::Fetching, Some(entity), e))
            }
            (Ok(_), Err(e)) => Err(self.abort(Stage::Fetching, Some(entity), e)),
        }
    }

    async fn write(
        &self,
        update: &LocationUpdate,
        snapshots: &Snapshots,
        token: &str,
    ) -> GeofenceResult<WriteReceipt> {
        tracing::debug!(
            entity = %update.entity,
            stage = %Stage::Writing,
            record_id = ?snapshots.previous.record_id,
            "writing membership"
        );
        self.writer
            .write(
                &update.entity,
                &snapshots.current,
                snapshots.previous.record_id,
                update.position,
                token,
            )
            .await
    }

    fn abort(&self, stage: Stage, entity: Option<&EntityId>, error: GeofenceError) -> GeofenceError {
        tracing::warn!(
            entity = entity.map(EntityId::as_str).unwrap_or("-"),
            kind = %self.kind.name,
            %stage,
            reason = error.abort_reason(),
            error = %error,
            "update aborted"
        );
        error
    }
}
