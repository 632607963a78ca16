//! Client for an HTTP cast bridge.
//!
//! The bridge is a sidecar that owns the casting protocol (mDNS discovery,
//! TLS sessions, media channel) and exposes it as a small REST API:
//!
//! | method | path | query | response |
//! |--------|------|-------|----------|
//! | `GET` | `/devices` | | `[DiscoveredDevice]` |
//! | `POST` | `/connect` | `uuid` | empty |
//! | `POST` | `/volume` | `uuid`, `level` | empty |
//! | `POST` | `/load` | `uuid`, `url`, `content_type` | empty |
//! | `GET` | `/status` | `uuid` | `MediaStatus` |
//!
//! Any non-2xx answer becomes [`CastError::Bridge`] carrying the body text.

use crate::capability::{CastDiscovery, CastSession, DiscoveredDevice, MediaStatus};
use crate::error::CastError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Maximum characters of an error body kept in [`CastError::Bridge`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Discovery and session factory backed by the bridge.
#[derive(Debug, Clone)]
pub struct HttpCastBridge {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCastBridge {
    /// Creates a client for the bridge at `base_url`; every request is
    /// bounded by `request_timeout`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("bridge http client setup failed, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, CastError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CastError::Bridge {
        status: status.as_u16(),
        message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

#[async_trait]
impl CastDiscovery for HttpCastBridge {
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>, CastError> {
        let resp = self.client.get(self.url("/devices")).send().await?;
        let devices: Vec<DiscoveredDevice> = check(resp).await?.json().await?;
        tracing::debug!(count = devices.len(), "cast bridge discovery returned devices");
        Ok(devices)
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn CastSession>, CastError> {
        let resp = self
            .client
            .post(self.url("/connect"))
            .query(&[("uuid", device.uuid.as_str())])
            .send()
            .await?;
        check(resp).await?;

        Ok(Arc::new(BridgeSession {
            bridge: self.clone(),
            uuid: device.uuid.clone(),
            name: device.name.clone(),
        }))
    }
}

/// A device session held open by the bridge.
#[derive(Debug, Clone)]
pub struct BridgeSession {
    bridge: HttpCastBridge,
    uuid: String,
    name: String,
}

#[async_trait]
impl CastSession for BridgeSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_volume(&self, level: f32) -> Result<(), CastError> {
        let level = level.clamp(0.0, 1.0).to_string();
        let resp = self
            .bridge
            .client
            .post(self.bridge.url("/volume"))
            .query(&[("uuid", self.uuid.as_str()), ("level", level.as_str())])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn load(&self, url: &str, content_type: &str) -> Result<(), CastError> {
        let resp = self
            .bridge
            .client
            .post(self.bridge.url("/load"))
            .query(&[
                ("uuid", self.uuid.as_str()),
                ("url", url),
                ("content_type", content_type),
            ])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn media_status(&self) -> Result<MediaStatus, CastError> {
        let resp = self
            .bridge
            .client
            .get(self.bridge.url("/status"))
            .query(&[("uuid", self.uuid.as_str())])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}
