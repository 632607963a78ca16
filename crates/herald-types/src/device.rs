//! Playback device state and commands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle of the playback device.
///
/// `Disconnected -> Connecting -> {Ready | Failed}`, and `Failed ->
/// Connecting` when discovery is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Discovery has not run yet.
    #[default]
    Disconnected,
    /// Discovery is in progress.
    Connecting,
    /// A session with the device is open.
    Ready,
    /// Discovery exhausted its attempts.
    Failed,
}

impl ConnectionState {
    /// Returns the string label for this state.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot of the shared device handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Friendly name of the target device.
    pub name: String,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Most recent discovery or connection error, if any.
    pub last_error: Option<String>,
}

impl DeviceHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Disconnected,
            last_error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }
}

/// Instruction to play one media URL on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackCommand {
    /// URL the device fetches the audio from.
    pub media_url: String,
    /// MIME type of the media behind `media_url`.
    pub content_type: String,
    /// Volume to force before playing, in `[0, 1]`. `None` leaves it as is.
    pub volume: Option<f32>,
}

impl PlaybackCommand {
    /// Builds a command, clamping `volume` into `[0, 1]`.
    pub fn new(
        media_url: impl Into<String>,
        content_type: impl Into<String>,
        volume: Option<f32>,
    ) -> Self {
        Self {
            media_url: media_url.into(),
            content_type: content_type.into(),
            volume: volume.map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }),
        }
    }
}
