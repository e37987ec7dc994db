//! Create-or-update of an entity's record with its new position and regions.

use crate::feature::{self, ApplyEditsResponse, EditFeature};
use crate::http::HttpTransport;
use geofence_core::config::EntityKind;
use geofence_core::error::{GeofenceError, GeofenceResult};
use geofence_core::types::{Coordinates, EntityId, RegionSet, WriteAction};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of a successful membership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub action: WriteAction,
    /// Backend record id; freshly assigned on create.
    pub record_id: Option<i64>,
}

pub struct MembershipWriter {
    transport: Arc<dyn HttpTransport>,
    kind: EntityKind,
}

impl MembershipWriter {
    pub fn new(transport: Arc<dyn HttpTransport>, kind: EntityKind) -> Self {
        Self { transport, kind }
    }

    /// Persists `regions` and `position` for `entity`.
    ///
    /// Without a `record_id` the record is created (keyed by the entity id
    /// attribute); with one it is updated in place.
    pub async fn write(
        &self,
        entity: &EntityId,
        regions: &RegionSet,
        record_id: Option<i64>,
        position: Coordinates,
        token: &str,
    ) -> GeofenceResult<WriteReceipt> {
        let (action, edits_field, edit) = self.edit(entity, regions, record_id, position);
        let edit_json = serde_json::to_string(&edit)
            .map_err(|e| GeofenceError::Write(format!("Failed to encode edit: {e}")))?;

        let mut form = vec![
            ("f".to_string(), "json".to_string()),
            (edits_field.to_string(), edit_json),
        ];
        if !token.is_empty() {
            form.push(("token".to_string(), token.to_string()));
        }

        let url = feature::apply_edits_url(&self.kind.endpoint)?;
        let body = self.transport.post_form(url, form).await.map_err(|e| {
            GeofenceError::Write(format!("Failed to post {} edit for {entity}: {e}", self.kind.name))
        })?;

        let response: ApplyEditsResponse = serde_json::from_str(&body)
            .map_err(|e| GeofenceError::Write(format!("Malformed applyEdits response: {e}")))?;
        if let Some(error) = &response.error {
            return Err(GeofenceError::Write(format!("applyEdits rejected: {error}")));
        }

        let (result, returned) = if let Some(r) = response.add_results.first() {
            (r, WriteAction::Created)
        } else if let Some(r) = response.update_results.first() {
            (r, WriteAction::Updated)
        } else {
            return Err(GeofenceError::Write(
                "No add or update result returned, unexpected protocol shape".into(),
            ));
        };

        if !result.success {
            let detail = result
                .error
                .as_ref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default();
            return Err(GeofenceError::Write(format!("Backend rejected write{detail}")));
        }

        if returned != action {
            tracing::warn!(entity = %entity, ?action, ?returned, "backend reported a different edit kind");
        }

        let receipt = WriteReceipt {
            action: returned,
            record_id: result.object_id.or(record_id),
        };
        tracing::info!(
            entity = %entity,
            kind = %self.kind.name,
            action = ?receipt.action,
            record_id = ?receipt.record_id,
            regions = %regions,
            "membership written"
        );
        Ok(receipt)
    }

    fn edit(
        &self,
        entity: &EntityId,
        regions: &RegionSet,
        record_id: Option<i64>,
        position: Coordinates,
    ) -> (WriteAction, &'static str, EditFeature) {
        let mut attributes = Map::new();
        attributes.insert(
            self.kind.membership_field.clone(),
            Value::String(regions.to_wire()),
        );

        let (action, field) = match record_id {
            None => {
                attributes.insert(
                    self.kind.id_field.clone(),
                    Value::String(entity.as_str().to_string()),
                );
                (WriteAction::Created, "adds")
            }
            Some(id) => {
                attributes.insert(self.kind.record_id_field.clone(), Value::from(id));
                (WriteAction::Updated, "updates")
            }
        };

        let feature = EditFeature {
            geometry: position.into(),
            attributes,
        };
        (action, field, feature)
    }
}
