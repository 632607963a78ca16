//! Announcement orchestration: cache, synthesis, composition, playback.
//!
//! [`AnnouncementService::announce`] runs the pipeline for one request:
//!
//! 1. Check the device is `Ready`. Nothing is synthesized for a device
//!    that cannot play it.
//! 2. Look the request's [`CacheKey`] up in the [`AudioCache`]; on a miss,
//!    synthesize, compose alarm tiers, and store the result. At most one
//!    build per key is in flight at a time.
//! 3. Dispatch the clip's URL to the device, forcing the alarm volume for
//!    priorities above 0.
//!
//! If step 2 fails for an alarm tier, the pre-shipped long alarm tone is
//! played instead so an alarm is never silently dropped. A normal
//! announcement whose synthesis fails plays the pre-shipped `empty` clip;
//! its other failures are surfaced.

use herald_audio::{
    AudioCache, CacheWriteError, CachedClip, Composer, CompositionError, SynthesisError, Synthesizer, Tone,
};
use herald_cast::{DeviceRegistry, DeviceUnavailableError, PlaybackConfirmation, PlaybackDispatcher, PlaybackError};
use herald_types::{
    AnnouncementRequest, AudioFormat, CacheKey, DeviceHandle, PlaybackCommand, Priority, ValidationError,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex;

/// URL prefix the router serves the clip cache under.
pub const CACHE_ROUTE: &str = "/cache";

/// URL prefix the router serves the static assets under.
pub const STATIC_ROUTE: &str = "/static";

/// Stem of the pre-shipped clip played when normal speech cannot be synthesized.
pub const EMPTY_ASSET: &str = "empty";

/// Every way an announcement or asset playback can fail.
#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("cache write failed: {0}")]
    CacheWrite(#[from] CacheWriteError),

    #[error(transparent)]
    DeviceUnavailable(#[from] DeviceUnavailableError),

    #[error("playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("asset not found: {0}")]
    AssetNotFound(String),
}

/// Where the played clip came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipSource {
    /// Served from the cache without synthesis.
    Cached,
    /// Synthesized (and, for alarms, composed) by this request.
    Synthesized,
    /// The build failed and a pre-shipped clip was played instead: the
    /// long alarm tone for alarms, `empty` for normal announcements.
    Fallback,
    /// A static asset requested by name.
    Asset,
}

/// Result of a successful announcement or asset playback.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub media_url: String,
    pub source: ClipSource,
    pub confirmation: PlaybackConfirmation,
}

/// Per-key build locks for in-flight synthesis.
#[derive(Debug, Default)]
struct BuildLocks {
    slots: StdMutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl BuildLocks {
    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.map().entry(key.clone()).or_default().clone()
    }

    /// Drops the slot once no other caller holds it.
    fn release(&self, key: &CacheKey) {
        let mut map = self.map();
        if map.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            map.remove(key);
        }
    }
}

/// Runs announcements against the shared cache, engine, and device.
pub struct AnnouncementService {
    cache: AudioCache,
    synthesizer: Arc<dyn Synthesizer>,
    composer: Arc<Composer>,
    registry: Arc<DeviceRegistry>,
    dispatcher: PlaybackDispatcher,
    static_dir: PathBuf,
    alarm_volume: f32,
    building: BuildLocks,
}

impl std::fmt::Debug for AnnouncementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncementService")
            .field("cache", &self.cache)
            .field("synthesizer", &self.synthesizer.id())
            .field("registry", &self.registry)
            .field("static_dir", &self.static_dir)
            .finish_non_exhaustive()
    }
}

impl AnnouncementService {
    pub fn new(
        cache: AudioCache,
        synthesizer: Arc<dyn Synthesizer>,
        composer: Composer,
        registry: Arc<DeviceRegistry>,
        dispatcher: PlaybackDispatcher,
        static_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            synthesizer,
            composer: Arc::new(composer),
            registry,
            dispatcher,
            static_dir: static_dir.into(),
            alarm_volume: 1.0,
            building: BuildLocks::default(),
        }
    }

    /// Sets the volume forced for priorities above 0.
    pub fn with_alarm_volume(mut self, volume: f32) -> Self {
        self.alarm_volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Current state of the playback device.
    pub fn device(&self) -> DeviceHandle {
        self.registry.snapshot()
    }

    /// Speaks `request` on the device.
    ///
    /// `base_url` is the scheme and authority the device can reach this
    /// server at, e.g. `http://192.168.1.10:5001`.
    pub async fn announce(&self, request: &AnnouncementRequest, base_url: &str) -> Result<Outcome, AnnounceError> {
        let session = self.registry.current()?;
        let priority = request.priority();

        let (media_url, content_type, source) = match self.prepare(request).await {
            Ok((clip, source)) => (
                join_url(base_url, CACHE_ROUTE, &clip.file_name()),
                clip.format.mime_type(),
                source,
            ),
            // Alarms degrade to the long tone whatever broke; normal
            // announcements only cover an unreachable engine.
            Err(e) if priority.is_alarm() => self.fallback(Tone::Long.asset_stem(), e, priority, base_url).await?,
            Err(e @ AnnounceError::Synthesis(_)) => self.fallback(EMPTY_ASSET, e, priority, base_url).await?,
            Err(e) => return Err(e),
        };

        let volume = priority.is_alarm().then_some(self.alarm_volume);
        let command = PlaybackCommand::new(&media_url, content_type, volume);
        let confirmation = self.play(session.as_ref(), &command).await?;

        Ok(Outcome {
            media_url,
            source,
            confirmation,
        })
    }

    /// Plays a pre-shipped static asset by file name, bypassing the cache.
    pub async fn play_by_name(&self, file_name: &str, base_url: &str) -> Result<Outcome, AnnounceError> {
        let format = asset_format(file_name)
            .ok_or_else(|| AnnounceError::AssetNotFound(file_name.to_string()))?;
        if !is_file(&self.static_dir.join(file_name)).await {
            return Err(AnnounceError::AssetNotFound(file_name.to_string()));
        }

        let session = self.registry.current()?;
        let media_url = join_url(base_url, STATIC_ROUTE, file_name);
        let command = PlaybackCommand::new(&media_url, format.mime_type(), None);
        let confirmation = self.play(session.as_ref(), &command).await?;

        Ok(Outcome {
            media_url,
            source: ClipSource::Asset,
            confirmation,
        })
    }

    async fn play(
        &self,
        session: &dyn herald_cast::CastSession,
        command: &PlaybackCommand,
    ) -> Result<PlaybackConfirmation, AnnounceError> {
        self.dispatcher.play(session, command).await.map_err(|e| {
            if e.is_connection_lost() {
                self.registry.invalidate(&e.to_string());
            }
            AnnounceError::Playback(e)
        })
    }

    /// Returns the cached clip for `request`, building it on a miss.
    async fn prepare(&self, request: &AnnouncementRequest) -> Result<(CachedClip, ClipSource), AnnounceError> {
        let key = request.cache_key();
        if let Some(hit) = self.cache.lookup(&key).await {
            tracing::debug!(key = %key, "cache hit");
            return Ok((hit, ClipSource::Cached));
        }

        let slot = self.building.slot(&key);
        let result = {
            let _building = slot.lock().await;
            // Another caller may have finished the build while we waited.
            match self.cache.lookup(&key).await {
                Some(hit) => Ok((hit, ClipSource::Cached)),
                None => self.build(request, &key).await.map(|clip| (clip, ClipSource::Synthesized)),
            }
        };
        drop(slot);
        self.building.release(&key);
        result
    }

    async fn build(&self, request: &AnnouncementRequest, key: &CacheKey) -> Result<CachedClip, AnnounceError> {
        let priority = request.priority();
        let raw = self
            .synthesizer
            .synthesize(request.text(), request.language(), request.slow())
            .await?;

        let clip = if priority.is_alarm() {
            let composer = self.composer.clone();
            tokio::task::spawn_blocking(move || composer.compose(&raw, priority))
                .await
                .map_err(|e| CompositionError::Join(e.to_string()))??
        } else {
            raw
        };

        let cached = self.cache.store(key, &clip).await?;
        tracing::info!(
            key = %key,
            engine = self.synthesizer.id(),
            priority = priority.as_u8(),
            bytes = clip.bytes.len(),
            "announcement clip cached"
        );
        Ok(cached)
    }

    /// Picks the pre-shipped clip `stem` to play in place of a failed build.
    ///
    /// Surfaces `error` when the asset is not installed.
    async fn fallback(
        &self,
        stem: &str,
        error: AnnounceError,
        priority: Priority,
        base_url: &str,
    ) -> Result<(String, &'static str, ClipSource), AnnounceError> {
        let Some((file_name, format)) = self.find_asset(stem).await else {
            tracing::error!(error = %error, asset = stem, "build failed and no fallback clip is installed");
            return Err(error);
        };
        tracing::warn!(
            error = %error,
            priority = priority.as_u8(),
            fallback = %file_name,
            "announcement build failed, playing fallback clip"
        );
        Ok((
            join_url(base_url, STATIC_ROUTE, &file_name),
            format.mime_type(),
            ClipSource::Fallback,
        ))
    }

    /// Probes formats in the same order as [`herald_audio::AlarmTones::load`].
    async fn find_asset(&self, stem: &str) -> Option<(String, AudioFormat)> {
        for format in AudioFormat::ALL {
            let file_name = format!("{stem}.{}", format.extension());
            if is_file(&self.static_dir.join(&file_name)).await {
                return Some((file_name, format));
            }
        }
        None
    }
}

/// Accepts plain audio file names only, never paths.
fn asset_format(file_name: &str) -> Option<AudioFormat> {
    let plain = !file_name.starts_with('.')
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if plain {
        AudioFormat::from_file_name(file_name)
    } else {
        None
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

fn join_url(base_url: &str, route: &str, file_name: &str) -> String {
    format!("{}{}/{}", base_url.trim_end_matches('/'), route, file_name)
}
