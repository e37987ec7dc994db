//! Geofence transition pipeline, notification emitter, and notification sinks.

pub mod emitter;
pub mod pipeline;
pub mod sink;

pub use emitter::{NotificationEmitter, PublishFlags};
pub use pipeline::{GeofenceEngine, Stage, UpdateOutcome};
pub use sink::{EventKind, Notification, Publisher};
