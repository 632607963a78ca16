//! Error types for device discovery and playback.

use herald_types::ConnectionState;
use thiserror::Error;

/// Failures reported by the casting capability itself.
#[derive(Debug, Error)]
pub enum CastError {
    /// The bridge could not be reached or the response could not be read.
    #[error("cast bridge request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge answered with a non-success status.
    #[error("cast bridge returned {status}: {message}")]
    Bridge { status: u16, message: String },

    /// Discovery ran but the target device was not among the results.
    #[error("device {target:?} not found (saw: {seen:?})")]
    NotFound { target: String, seen: Vec<String> },

    /// The device refused or dropped a command.
    #[error("device error: {0}")]
    Device(String),
}

impl CastError {
    /// Whether the session to the device is likely gone, as opposed to a
    /// single command being refused.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_request(),
            Self::Bridge { status, .. } => *status == 404 || *status == 410,
            Self::NotFound { .. } => true,
            Self::Device(_) => false,
        }
    }
}

/// The device is not `Ready`, so nothing can be played.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("device {name:?} unavailable ({state}){}", detail(.last_error))]
pub struct DeviceUnavailableError {
    pub name: String,
    pub state: ConnectionState,
    pub last_error: Option<String>,
}

fn detail(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(": {e}"))
        .unwrap_or_default()
}

/// A play command did not result in confirmed playback.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to set volume: {0}")]
    Volume(#[source] CastError),

    #[error("failed to load media: {0}")]
    Load(#[source] CastError),

    #[error("failed to read player status: {0}")]
    Status(#[source] CastError),

    #[error("device rejected media: {0}")]
    Rejected(String),

    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: &'static str, after_ms: u64 },
}

impl PlaybackError {
    /// Whether the failure suggests the device session is gone.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Volume(e) | Self::Load(e) | Self::Status(e) => e.is_connection_lost(),
            Self::Rejected(_) | Self::Timeout { .. } => false,
        }
    }
}
