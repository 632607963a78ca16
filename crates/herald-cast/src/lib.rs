//! Playback device discovery and control for Herald.
//!
//! The [`DeviceRegistry`] owns the single shared device session and its
//! connection state; the [`PlaybackDispatcher`] turns a media URL into
//! confirmed playback on that session. Both drive the casting capability
//! through the [`CastDiscovery`] and [`CastSession`] traits.

pub mod bridge;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;

pub use bridge::{BridgeSession, HttpCastBridge};
pub use capability::{CastDiscovery, CastSession, DiscoveredDevice, IdleReason, MediaStatus, PlayerState};
pub use config::DeviceConfig;
pub use dispatch::{PlaybackConfirmation, PlaybackDispatcher};
pub use error::{CastError, DeviceUnavailableError, PlaybackError};
pub use registry::{DeviceRegistry, DiscoveryPolicy};
