//! The casting capability consumed by the registry and dispatcher.
//!
//! Herald does not speak a casting protocol itself. It drives whatever
//! implements [`CastDiscovery`] and [`CastSession`]; production uses the
//! HTTP bridge in [`crate::bridge`], tests use in-memory fakes.

use crate::error::CastError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A device seen on the network during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Friendly name, as configured on the device.
    pub name: String,
    /// Stable identifier used to address the device.
    pub uuid: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Player state as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Why the player went idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdleReason {
    Finished,
    Cancelled,
    Interrupted,
    Error,
}

/// Snapshot of the device's media channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub player_state: PlayerState,
    #[serde(default)]
    pub idle_reason: Option<IdleReason>,
    /// URL of the media currently (or last) loaded.
    #[serde(default)]
    pub content_id: Option<String>,
}

/// Finds devices and opens sessions to them.
#[async_trait]
pub trait CastDiscovery: Send + Sync {
    /// Scans the network once and returns every device that answered.
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>, CastError>;

    /// Opens a long-lived session to `device`.
    async fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn CastSession>, CastError>;
}

/// A live session with one device.
///
/// Sessions are shared by all concurrent playback requests; implementations
/// must tolerate reentrant control commands.
#[async_trait]
pub trait CastSession: Send + Sync {
    fn name(&self) -> &str;

    /// Sets the output level, `0.0..=1.0`.
    async fn set_volume(&self, level: f32) -> Result<(), CastError>;

    /// Asks the device to fetch and play `url`.
    async fn load(&self, url: &str, content_type: &str) -> Result<(), CastError>;

    async fn media_status(&self) -> Result<MediaStatus, CastError>;
}

impl std::fmt::Debug for dyn CastSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastSession").field("name", &self.name()).finish()
    }
}
