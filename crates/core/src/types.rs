//! Domain types for the geofence transition engine.

use crate::error::{GeofenceError, GeofenceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Separator used for the membership attribute on the wire.
pub const MEMBERSHIP_SEPARATOR: &str = ",";

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Caller-supplied, opaque entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A validated inbound update: who moved, and where to.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub entity: EntityId,
    pub position: Coordinates,
}

impl LocationUpdate {
    pub fn new(entity: EntityId, position: Coordinates) -> Self {
        Self { entity, position }
    }

    /// Parses an inbound webhook message.
    ///
    /// The id lives under a kind-specific field (`asset`, `user`, ...);
    /// `lat` and `lng` are always named as such. Numeric ids are accepted
    /// and stringified. Any missing field is a validation error.
    pub fn from_message(message: &Value, id_field: &str) -> GeofenceResult<Self> {
        let missing = || {
            GeofenceError::Validation(format!(
                "You must provide \"{id_field}\", \"lat\" and \"lng\" parameters"
            ))
        };

        let entity = match message.get(id_field) {
            Some(Value::String(s)) if !s.is_empty() => EntityId::new(s.clone()),
            Some(Value::Number(n)) => EntityId::new(n.to_string()),
            _ => return Err(missing()),
        };
        let lat = message.get("lat").and_then(coordinate).ok_or_else(missing)?;
        let lng = message.get("lng").and_then(coordinate).ok_or_else(missing)?;

        Ok(Self::new(entity, Coordinates::new(lat, lng)))
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Set of region ids. Comparison is exact, case-sensitive string equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionSet(BTreeSet<String>);

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the comma-joined membership attribute. Empty input yields
    /// the empty set.
    pub fn from_wire(encoded: &str) -> Self {
        encoded
            .split(MEMBERSHIP_SEPARATOR)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Encodes as the comma-joined membership attribute.
    pub fn to_wire(&self) -> String {
        let ids: Vec<&str> = self.0.iter().map(String::as_str).collect();
        ids.join(MEMBERSHIP_SEPARATOR)
    }

    pub fn insert(&mut self, region: impl Into<String>) -> bool {
        self.0.insert(region.into())
    }

    pub fn contains(&self, region: &str) -> bool {
        self.0.contains(region)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Regions in `self` that are not in `other`.
    pub fn difference(&self, other: &RegionSet) -> RegionSet {
        RegionSet(self.0.difference(&other.0).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for RegionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RegionSet(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_wire())
    }
}

/// Last persisted state of an entity in the backend.
///
/// `record_id` is `None` until the first successful write; its absence is
/// the signal to create rather than update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    pub regions: RegionSet,
    pub record_id: Option<i64>,
}

/// Whether a membership write created a new record or updated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Created,
    Updated,
}
