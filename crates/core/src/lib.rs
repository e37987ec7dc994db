//! Domain models, configuration, transition computation, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies beyond reading a config file.

pub mod config;
pub mod error;
pub mod transition;
pub mod types;

pub use config::{EntityKind, GeofenceConfig};
pub use error::{GeofenceError, GeofenceResult};
pub use transition::Transition;
pub use types::{Coordinates, EntityId, LocationUpdate, Membership, RegionSet, WriteAction};
