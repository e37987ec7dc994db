//! Region membership reads: which fences contain a point, and which fences
//! an entity was last recorded in.

use crate::feature::{self, FeatureSet};
use crate::http::HttpTransport;
use geofence_core::config::{EntityKind, RegionStoreConfig};
use geofence_core::error::{GeofenceError, GeofenceResult};
use geofence_core::types::{Coordinates, EntityId, Membership, RegionSet};
use std::sync::Arc;

pub struct RegionQueryService {
    transport: Arc<dyn HttpTransport>,
    regions: RegionStoreConfig,
    kind: EntityKind,
}

impl RegionQueryService {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        regions: RegionStoreConfig,
        kind: EntityKind,
    ) -> Self {
        Self {
            transport,
            regions,
            kind,
        }
    }

    /// Ids of every region whose polygon contains `position`.
    pub async fn regions_containing(
        &self,
        position: Coordinates,
        token: &str,
    ) -> GeofenceResult<RegionSet> {
        let url = feature::point_query_url(
            &self.regions.endpoint,
            position,
            &self.regions.id_field,
            token,
        )?;

        let body = self.transport.get(url).await.map_err(|e| {
            GeofenceError::Query(format!("Failed to fetch regions for location: {e}"))
        })?;
        let set = parse_feature_set(&body, "region")?;

        let mut regions = RegionSet::new();
        for f in &set.features {
            let id = f.string_attribute(&self.regions.id_field).ok_or_else(|| {
                GeofenceError::Query(format!(
                    "Region feature missing '{}' attribute",
                    self.regions.id_field
                ))
            })?;
            regions.insert(id);
        }

        tracing::debug!(lat = position.lat, lng = position.lng, regions = %regions, "regions at location");
        Ok(regions)
    }

    /// Last recorded regions and backend record id for `entity`.
    ///
    /// Zero matching records is [`GeofenceError::EntityNotFound`] unless the
    /// kind is configured with `create_missing`, in which case the entity
    /// is reported as new: no regions, no record id.
    pub async fn last_known_membership(
        &self,
        entity: &EntityId,
        token: &str,
    ) -> GeofenceResult<Membership> {
        let url = feature::attribute_query_url(
            &self.kind.endpoint,
            &self.kind.id_field,
            entity.as_str(),
            &[
                self.kind.record_id_field.as_str(),
                self.kind.membership_field.as_str(),
            ],
            token,
        )?;

        let body = self.transport.get(url).await.map_err(|e| {
            GeofenceError::Query(format!("Failed to fetch last known regions for {entity}: {e}"))
        })?;
        let set = parse_feature_set(&body, &self.kind.name)?;

        let Some(record) = set.features.first() else {
            if self.kind.create_missing {
                tracing::info!(entity = %entity, kind = %self.kind.name, "no record yet, treating as new");
                return Ok(Membership::default());
            }
            return Err(GeofenceError::EntityNotFound(format!(
                "Could not find {} {entity}",
                self.kind.name
            )));
        };

        let regions = record
            .string_attribute(&self.kind.membership_field)
            .map(|encoded| RegionSet::from_wire(&encoded))
            .unwrap_or_default();

        Ok(Membership {
            regions,
            record_id: record.integer_attribute(&self.kind.record_id_field),
        })
    }
}

fn parse_feature_set(body: &str, layer: &str) -> GeofenceResult<FeatureSet> {
    let set: FeatureSet = serde_json::from_str(body)
        .map_err(|e| GeofenceError::Query(format!("Malformed {layer} query response: {e}")))?;
    if let Some(error) = &set.error {
        return Err(GeofenceError::Query(format!("{layer} query rejected: {error}")));
    }
    Ok(set)
}
