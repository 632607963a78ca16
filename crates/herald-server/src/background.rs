//! Background tasks for the Herald server.
//!
//! Includes:
//! - Startup discovery of the playback device.
//! - Periodic rediscovery while the device is down.

use herald_cast::{DeviceRegistry, DiscoveryPolicy};
use herald_types::ConnectionState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Discovers the device, then keeps it discovered.
///
/// The first run happens immediately; requests that need the device get
/// `503` until it completes. With an `interval`, the task then wakes every
/// `interval` and reruns discovery whenever the registry is `Failed` or
/// `Disconnected`. Without one it returns after the first run.
pub async fn run_discovery(registry: Arc<DeviceRegistry>, policy: DiscoveryPolicy, interval: Option<Duration>) {
    tracing::info!(
        device = %registry.snapshot().name,
        attempts = policy.max_attempts,
        "starting device discovery"
    );
    discover_once(&registry, &policy).await;

    let Some(interval) = interval else {
        tracing::info!("device rediscovery disabled (interval=0)");
        return;
    };

    loop {
        sleep(interval).await;

        match registry.state() {
            ConnectionState::Failed | ConnectionState::Disconnected => {
                tracing::info!("playback device down, rerunning discovery");
                discover_once(&registry, &policy).await;
            }
            ConnectionState::Ready | ConnectionState::Connecting => {}
        }
    }
}

async fn discover_once(registry: &DeviceRegistry, policy: &DiscoveryPolicy) {
    // The registry logs each attempt; only the outcome is reported here.
    if let Err(e) = registry.discover(policy).await {
        tracing::error!("device discovery failed: {}", e);
    }
}
