//! `[device]` configuration section.

use crate::bridge::HttpCastBridge;
use crate::dispatch::PlaybackDispatcher;
use crate::registry::DiscoveryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Target device and the timing bounds used to reach it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    /// Friendly name of the speaker to announce on.
    #[serde(default = "default_name")]
    pub name: String,

    /// Base URL of the cast bridge sidecar.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Bound on one discovery attempt.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,

    /// Seconds between rediscovery checks while the device is down; 0 disables.
    #[serde(default = "default_rediscover_interval_secs")]
    pub rediscover_interval_secs: u64,

    /// Bound on each volume, load, or status command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// How long to wait for the device to report active playback.
    #[serde(default = "default_playback_ack_timeout_ms")]
    pub playback_ack_timeout_ms: u64,

    /// Volume forced for alarm priorities.
    #[serde(default = "default_alarm_volume")]
    pub alarm_volume: f32,
}

fn default_name() -> String {
    "Kitchen speaker".to_string()
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8009".to_string()
}

fn default_discovery_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_discovery_timeout_ms() -> u64 {
    10_000
}

fn default_rediscover_interval_secs() -> u64 {
    60
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_playback_ack_timeout_ms() -> u64 {
    10_000
}

fn default_alarm_volume() -> f32 {
    1.0
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            bridge_url: default_bridge_url(),
            discovery_attempts: default_discovery_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            rediscover_interval_secs: default_rediscover_interval_secs(),
            command_timeout_ms: default_command_timeout_ms(),
            playback_ack_timeout_ms: default_playback_ack_timeout_ms(),
            alarm_volume: default_alarm_volume(),
        }
    }
}

impl DeviceConfig {
    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        DiscoveryPolicy {
            max_attempts: self.discovery_attempts.max(1),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            attempt_timeout: Duration::from_millis(self.discovery_timeout_ms),
        }
    }

    /// `None` when background rediscovery is disabled.
    pub fn rediscover_interval(&self) -> Option<Duration> {
        (self.rediscover_interval_secs > 0).then(|| Duration::from_secs(self.rediscover_interval_secs))
    }

    pub fn dispatcher(&self) -> PlaybackDispatcher {
        PlaybackDispatcher::new(
            Duration::from_millis(self.command_timeout_ms),
            Duration::from_millis(self.playback_ack_timeout_ms),
        )
    }

    /// Bridge client whose per-request timeout matches the command bound.
    pub fn bridge(&self) -> HttpCastBridge {
        HttpCastBridge::new(&self.bridge_url, Duration::from_millis(self.command_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_discovery_contract() {
        let config = DeviceConfig::default();
        let policy = config.discovery_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retry_delay, Duration::from_secs(2));
        assert_eq!(config.alarm_volume, 1.0);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let config = DeviceConfig {
            discovery_attempts: 0,
            ..DeviceConfig::default()
        };
        assert_eq!(config.discovery_policy().max_attempts, 1);
    }

    #[test]
    fn rediscovery_can_be_disabled() {
        let config = DeviceConfig {
            rediscover_interval_secs: 0,
            ..DeviceConfig::default()
        };
        assert!(config.rediscover_interval().is_none());
        assert_eq!(
            DeviceConfig::default().rediscover_interval(),
            Some(Duration::from_secs(60))
        );
    }
}
