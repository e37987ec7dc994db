//! Feature-service wire format: query URLs, query responses, and edits.

use geofence_core::error::{GeofenceError, GeofenceResult};
use geofence_core::types::Coordinates;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Spatial reference id for WGS84 lat/lng.
pub const WGS84_WKID: u32 = 4326;

// ---------------------------------------------------------------------------
// Query URLs
// ---------------------------------------------------------------------------

/// Point-intersects-polygon query against a polygon layer.
pub fn point_query_url(
    endpoint: &str,
    position: Coordinates,
    out_field: &str,
    token: &str,
) -> GeofenceResult<Url> {
    let geometry = format!("{},{}", position.lng, position.lat);
    let wkid = WGS84_WKID.to_string();
    let params = [
        ("geometryType", "esriGeometryPoint"),
        ("geometry", geometry.as_str()),
        ("inSR", wkid.as_str()),
        ("spatialRel", "esriSpatialRelIntersects"),
        ("outFields", out_field),
        ("returnGeometry", "false"),
        ("f", "json"),
    ];
    layer_url(endpoint, "query", &params, token)
}

/// Attribute-equality query for a single record.
pub fn attribute_query_url(
    endpoint: &str,
    field: &str,
    value: &str,
    out_fields: &[&str],
    token: &str,
) -> GeofenceResult<Url> {
    let clause = where_equals(field, value);
    let mut fields: Vec<&str> = Vec::with_capacity(out_fields.len());
    for &f in out_fields {
        if !fields.contains(&f) {
            fields.push(f);
        }
    }
    let fields = fields.join(",");
    let params = [
        ("where", clause.as_str()),
        ("outFields", fields.as_str()),
        ("returnGeometry", "false"),
        ("resultRecordCount", "1"),
        ("f", "json"),
    ];
    layer_url(endpoint, "query", &params, token)
}

/// `applyEdits` endpoint of a feature layer.
pub fn apply_edits_url(endpoint: &str) -> GeofenceResult<Url> {
    layer_url(endpoint, "applyEdits", &[], "")
}

/// `<field> = '<value>'` with embedded quotes doubled.
pub fn where_equals(field: &str, value: &str) -> String {
    format!("{field} = '{}'", value.replace('\'', "''"))
}

fn layer_url(
    endpoint: &str,
    operation: &str,
    params: &[(&str, &str)],
    token: &str,
) -> GeofenceResult<Url> {
    let base = format!("{}/{operation}", endpoint.trim_end_matches('/'));
    let mut url = Url::parse(&base)
        .map_err(|e| GeofenceError::Config(format!("Invalid layer endpoint {endpoint}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.extend_pairs(params.iter().copied());
        if !token.is_empty() {
            query.append_pair("token", token);
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Error object a feature service embeds in an otherwise 200 response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, alias = "description")]
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}: {}", self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if !self.details.is_empty() {
            write!(f, " ({})", self.details.join("; "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Feature {
    /// Attribute rendered as a string; numbers are stringified.
    pub fn string_attribute(&self, field: &str) -> Option<String> {
        match self.attributes.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn integer_attribute(&self, field: &str) -> Option<i64> {
        self.attributes.get(field)?.as_i64()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResult {
    pub success: bool,
    #[serde(default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsResponse {
    #[serde(default)]
    pub add_results: Vec<EditResult>,
    #[serde(default)]
    pub update_results: Vec<EditResult>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpatialReference {
    pub wkid: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointGeometry {
    pub x: f64,
    pub y: f64,
    pub spatial_reference: SpatialReference,
}

impl From<Coordinates> for PointGeometry {
    fn from(position: Coordinates) -> Self {
        Self {
            x: position.lng,
            y: position.lat,
            spatial_reference: SpatialReference { wkid: WGS84_WKID },
        }
    }
}

/// Feature body for an `adds` or `updates` edit.
#[derive(Debug, Clone, Serialize)]
pub struct EditFeature {
    pub geometry: PointGeometry,
    pub attributes: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn point_query_puts_lng_first() {
        let url = point_query_url(
            "https://example.com/Fences/FeatureServer/0/",
            Coordinates::new(40.756, -73.963),
            "OBJECTID",
            "tok",
        )
        .unwrap();

        assert_eq!(url.path(), "/Fences/FeatureServer/0/query");
        let q = pairs(&url);
        assert!(q.contains(&("geometry".into(), "-73.963,40.756".into())));
        assert!(q.contains(&("inSR".into(), "4326".into())));
        assert!(q.contains(&("spatialRel".into(), "esriSpatialRelIntersects".into())));
        assert_eq!(q.last().unwrap(), &("token".into(), "tok".into()));
    }

    #[test]
    fn attribute_query_dedupes_fields_and_escapes() {
        let url = attribute_query_url(
            "https://example.com/Assets/FeatureServer/0",
            "AssetID",
            "O'Brien",
            &["OBJECTID", "LastKnownGeofences", "OBJECTID"],
            "",
        )
        .unwrap();

        let q = pairs(&url);
        assert!(q.contains(&("where".into(), "AssetID = 'O''Brien'".into())));
        assert!(q.contains(&("outFields".into(), "OBJECTID,LastKnownGeofences".into())));
        assert!(q.contains(&("resultRecordCount".into(), "1".into())));
        assert!(!q.iter().any(|(k, _)| k == "token"));
    }

    #[test]
    fn apply_edits_has_no_query() {
        let url = apply_edits_url("https://example.com/Assets/FeatureServer/0").unwrap();
        assert_eq!(url.as_str(), "https://example.com/Assets/FeatureServer/0/applyEdits");
    }

    #[test]
    fn bad_endpoint_is_config_error() {
        assert!(matches!(
            apply_edits_url("not a url"),
            Err(GeofenceError::Config(_))
        ));
    }

    #[test]
    fn edit_feature_serializes_point() {
        let feature = EditFeature {
            geometry: Coordinates::new(1.5, 2.5).into(),
            attributes: Map::new(),
        };
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["geometry"]["x"], 2.5);
        assert_eq!(json["geometry"]["y"], 1.5);
        assert_eq!(json["geometry"]["spatialReference"]["wkid"], 4326);
    }

    #[test]
    fn numeric_attributes_stringify() {
        let set: FeatureSet =
            serde_json::from_str(r#"{"features":[{"attributes":{"OBJECTID":17}}]}"#).unwrap();
        assert_eq!(set.features[0].string_attribute("OBJECTID").as_deref(), Some("17"));
        assert_eq!(set.features[0].integer_attribute("OBJECTID"), Some(17));
    }
}
