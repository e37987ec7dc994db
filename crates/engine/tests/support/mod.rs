//! In-memory feature service standing in for the geodata backend.

#![allow(dead_code)]

use async_trait::async_trait;
use geofence_core::error::{GeofenceError, GeofenceResult};
use geofence_core::GeofenceConfig;
use geofence_engine::{Notification, Publisher};
use geofence_provider::HttpTransport;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use url::Url;

pub const CONFIG: &str = r#"{
    "auth": { "clientId": "app", "clientSecret": "secret", "tokenUrl": "https://auth.test/oauth2/token" },
    "regions": { "endpoint": "https://gis.test/Fences/FeatureServer/0" },
    "entities": {
        "asset": {
            "endpoint": "https://gis.test/Assets/FeatureServer/0",
            "idField": "AssetID"
        },
        "user": {
            "endpoint": "https://gis.test/Users/FeatureServer/0",
            "idField": "UserID",
            "createMissing": true
        }
    }
}"#;

pub fn config() -> GeofenceConfig {
    GeofenceConfig::from_json(CONFIG).unwrap()
}

#[derive(Debug, Clone)]
pub struct Record {
    pub entity: String,
    pub object_id: Option<i64>,
    pub fences: String,
}

#[derive(Default)]
pub struct State {
    /// Region ids returned for a `"lng,lat"` geometry.
    pub fences_at: HashMap<String, Vec<String>>,
    pub records: Vec<Record>,
    pub next_object_id: i64,
    pub fail_token: bool,
    pub fail_regions: bool,
    pub fail_entities: bool,
    /// Replaces the applyEdits reply when set.
    pub edits_reply: Option<String>,
    pub token_requests: usize,
    pub edits: Vec<(String, Value)>,
    pub log: Vec<String>,
}

/// Ordered record of round trips and publishes shared across fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct FakeBackend {
    pub state: Mutex<State>,
    /// When set, both layer queries wait here, so they must be in flight together.
    pub rendezvous: Option<Barrier>,
    pub journal: Option<Journal>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().next_object_id = 1000;
        backend
    }

    pub fn with_rendezvous() -> Self {
        let mut backend = Self::new();
        backend.rendezvous = Some(Barrier::new(2));
        backend
    }

    /// Each round trip yields once before it is journaled, so publishes
    /// already dispatched get to run and land ahead of it.
    pub fn with_journal(journal: Journal) -> Self {
        let mut backend = Self::new();
        backend.journal = Some(journal);
        backend
    }

    async fn note(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry.clone());
        if let Some(journal) = &self.journal {
            tokio::task::yield_now().await;
            journal.lock().unwrap().push(entry);
        }
    }

    pub fn fences_at(&self, lat: f64, lng: f64, ids: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .fences_at
            .insert(format!("{lng},{lat}"), ids.iter().map(|s| s.to_string()).collect());
    }

    pub fn record(&self, entity: &str, object_id: Option<i64>, fences: &str) {
        self.state.lock().unwrap().records.push(Record {
            entity: entity.into(),
            object_id,
            fences: fences.into(),
        });
    }

    pub fn find(&self, entity: &str) -> Option<Record> {
        let state = self.state.lock().unwrap();
        state.records.iter().find(|r| r.entity == entity).cloned()
    }

    pub fn edits(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().edits.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn token_requests(&self) -> usize {
        self.state.lock().unwrap().token_requests
    }

    fn query_regions(&self, url: &Url) -> GeofenceResult<String> {
        let state = self.state.lock().unwrap();
        if state.fail_regions {
            return Err(GeofenceError::Transport("HTTP 500 from regions".into()));
        }
        let geometry = param(url, "geometry").unwrap_or_default();
        let features: Vec<Value> = state
            .fences_at
            .get(&geometry)
            .into_iter()
            .flatten()
            .map(|id| json!({ "attributes": { "OBJECTID": id } }))
            .collect();
        Ok(json!({ "features": features }).to_string())
    }

    fn query_entity(&self, url: &Url) -> GeofenceResult<String> {
        let state = self.state.lock().unwrap();
        if state.fail_entities {
            return Err(GeofenceError::Transport("HTTP 500 from entities".into()));
        }
        let clause = param(url, "where").unwrap_or_default();
        let wanted = clause
            .split_once('\'')
            .map(|(_, rest)| rest.trim_end_matches('\'').replace("''", "'"))
            .unwrap_or_default();
        let features: Vec<Value> = state
            .records
            .iter()
            .filter(|r| r.entity == wanted)
            .take(1)
            .map(|r| {
                let mut attributes = json!({ "LastKnownGeofences": r.fences });
                if let Some(id) = r.object_id {
                    attributes["OBJECTID"] = json!(id);
                }
                json!({ "attributes": attributes })
            })
            .collect();
        Ok(json!({ "features": features }).to_string())
    }

    fn apply_edits(&self, form: &[(String, String)], id_field: &str) -> GeofenceResult<String> {
        let mut state = self.state.lock().unwrap();
        let (op, raw) = form
            .iter()
            .find(|(k, _)| k == "adds" || k == "updates")
            .cloned()
            .ok_or_else(|| GeofenceError::Transport("no edits in body".into()))?;
        let edit: Value = serde_json::from_str(&raw).unwrap();
        state.edits.push((op.clone(), edit.clone()));

        if let Some(reply) = state.edits_reply.clone() {
            return Ok(reply);
        }

        let fences = edit["attributes"]["LastKnownGeofences"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if op == "adds" {
            let object_id = state.next_object_id;
            state.next_object_id += 1;
            let entity = edit["attributes"][id_field].as_str().unwrap_or_default().to_string();
            state.records.push(Record {
                entity,
                object_id: Some(object_id),
                fences,
            });
            Ok(json!({ "addResults": [{ "success": true, "objectId": object_id }], "updateResults": [] }).to_string())
        } else {
            let object_id = edit["attributes"]["OBJECTID"].as_i64();
            let found = state.records.iter_mut().find(|r| r.object_id == object_id);
            let success = match found {
                Some(record) => {
                    record.fences = fences;
                    true
                }
                None => false,
            };
            Ok(json!({ "addResults": [], "updateResults": [{ "success": success, "objectId": object_id }] }).to_string())
        }
    }
}

fn param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn get(&self, url: Url) -> GeofenceResult<String> {
        let path = url.path().to_string();
        self.note(format!("GET {path}")).await;

        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }

        if path.starts_with("/Fences/") {
            self.query_regions(&url)
        } else {
            self.query_entity(&url)
        }
    }

    async fn post_form(&self, url: Url, form: Vec<(String, String)>) -> GeofenceResult<String> {
        let path = url.path().to_string();
        self.note(format!("POST {path}")).await;

        if url.host_str() == Some("auth.test") {
            let mut state = self.state.lock().unwrap();
            state.token_requests += 1;
            if state.fail_token {
                return Err(GeofenceError::Transport("HTTP 401 from token endpoint".into()));
            }
            return Ok(json!({ "access_token": "tok-1", "expires_in": 7200 }).to_string());
        }

        let id_field = if path.starts_with("/Users/") { "UserID" } else { "AssetID" };
        self.apply_edits(&form, id_field)
    }
}

/// Collects notifications in dispatch-completion order.
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<Notification>>,
    pub journal: Option<Journal>,
}

impl RecordingPublisher {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal: Some(journal),
            ..Default::default()
        }
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.channel.clone())
            .collect();
        channels.sort();
        channels
    }

    pub fn message(&self, channel: &str) -> Option<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.channel == channel)
            .map(|n| n.message.clone())
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, notification: &Notification) -> GeofenceResult<()> {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("publish {}", notification.channel));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
