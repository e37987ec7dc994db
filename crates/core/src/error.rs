//! Centralized error types for the geofence workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to pipeline stages.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeofenceError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl GeofenceError {
    /// Caller-facing reason attached to an aborted update.
    pub fn abort_reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "missing parameters",
            Self::Auth(_) | Self::Store(_) => "auth failure",
            Self::Query(_) | Self::EntityNotFound(_) => "fetch failure",
            Self::Write(_) => "write failure",
            Self::Transport(_) => "transport failure",
            Self::Publish(_) => "publish failure",
            Self::Config(_) => "configuration error",
        }
    }
}

pub type GeofenceResult<T> = Result<T, GeofenceError>;
