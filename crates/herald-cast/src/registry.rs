//! Discovery and ownership of the single shared playback device.
//!
//! The registry moves through `Disconnected -> Connecting -> {Ready |
//! Failed}` and back to `Connecting` on retry. Only [`DeviceRegistry::discover`]
//! and [`DeviceRegistry::invalidate`] write the state; readers take a
//! snapshot or the live session without ever waiting on discovery.

use crate::capability::{CastDiscovery, CastSession};
use crate::error::{CastError, DeviceUnavailableError};
use herald_types::{ConnectionState, DeviceHandle};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Bounds on one discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    /// Total attempts before giving up; at least one is always made.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// Upper bound on a single scan-and-connect attempt.
    pub attempt_timeout: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct Slot {
    handle: DeviceHandle,
    session: Option<Arc<dyn CastSession>>,
}

pub struct DeviceRegistry {
    discovery: Arc<dyn CastDiscovery>,
    slot: RwLock<Slot>,
    /// Serialises discovery runs so two callers never race on the state.
    discovering: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("handle", &self.snapshot())
            .finish()
    }
}

impl DeviceRegistry {
    /// Creates a registry targeting the device named `target_name`.
    pub fn new(discovery: Arc<dyn CastDiscovery>, target_name: impl Into<String>) -> Self {
        Self {
            discovery,
            slot: RwLock::new(Slot {
                handle: DeviceHandle::new(target_name),
                session: None,
            }),
            discovering: tokio::sync::Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(|poisoned| {
            tracing::error!("device registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(|poisoned| {
            tracing::error!("device registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns a copy of the device handle.
    pub fn snapshot(&self) -> DeviceHandle {
        self.read().handle.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.read().handle.state
    }

    /// Returns the live session if the device is `Ready`.
    ///
    /// Never blocks on discovery: any other state is an immediate
    /// [`DeviceUnavailableError`].
    pub fn current(&self) -> Result<Arc<dyn CastSession>, DeviceUnavailableError> {
        let slot = self.read();
        match (&slot.session, slot.handle.state) {
            (Some(session), ConnectionState::Ready) => Ok(session.clone()),
            _ => Err(unavailable(&slot.handle)),
        }
    }

    /// Runs bounded discovery for the target device.
    ///
    /// On success the registry becomes `Ready` and holds the session. When
    /// every attempt fails it becomes `Failed`, the last error is kept on
    /// the handle, and the error is returned; callers log it and carry on.
    pub async fn discover(&self, policy: &DiscoveryPolicy) -> Result<DeviceHandle, DeviceUnavailableError> {
        let _running = self.discovering.lock().await;

        let target = {
            let mut slot = self.write();
            slot.handle.state = ConnectionState::Connecting;
            slot.session = None;
            slot.handle.name.clone()
        };

        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match tokio::time::timeout(policy.attempt_timeout, self.try_connect(&target)).await {
                Ok(Ok(session)) => {
                    let mut slot = self.write();
                    slot.handle.state = ConnectionState::Ready;
                    slot.handle.last_error = None;
                    slot.session = Some(session);
                    tracing::info!(device = %target, attempt, "playback device ready");
                    return Ok(slot.handle.clone());
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "discovery attempt timed out after {}ms",
                        policy.attempt_timeout.as_millis()
                    )
                }
            }

            tracing::warn!(
                device = %target,
                attempt,
                max_attempts,
                error = %last_error,
                "device discovery attempt failed"
            );

            if attempt < max_attempts {
                tokio::time::sleep(policy.retry_delay).await;
            }
        }

        let mut slot = self.write();
        slot.handle.state = ConnectionState::Failed;
        slot.handle.last_error = Some(last_error);
        tracing::error!(
            device = %target,
            attempts = max_attempts,
            "device discovery exhausted, serving without playback"
        );
        Err(unavailable(&slot.handle))
    }

    async fn try_connect(&self, target: &str) -> Result<Arc<dyn CastSession>, CastError> {
        let devices = self.discovery.discover().await?;
        let device = devices
            .iter()
            .find(|d| d.name == target)
            .ok_or_else(|| CastError::NotFound {
                target: target.to_string(),
                seen: devices.iter().map(|d| d.name.clone()).collect(),
            })?;
        self.discovery.connect(device).await
    }

    /// Drops the session after it was observed to be dead.
    ///
    /// Moves a `Ready` registry to `Failed` so the health check reports it
    /// and background rediscovery picks it up. Has no effect while a
    /// discovery run is in progress.
    pub fn invalidate(&self, reason: &str) {
        let mut slot = self.write();
        if slot.handle.state != ConnectionState::Ready {
            return;
        }
        slot.handle.state = ConnectionState::Failed;
        slot.handle.last_error = Some(reason.to_string());
        slot.session = None;
        tracing::warn!(device = %slot.handle.name, reason, "playback device session lost");
    }
}

fn unavailable(handle: &DeviceHandle) -> DeviceUnavailableError {
    DeviceUnavailableError {
        name: handle.name.clone(),
        state: handle.state,
        last_error: handle.last_error.clone(),
    }
}
