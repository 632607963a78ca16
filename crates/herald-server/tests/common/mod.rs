#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use herald_audio::pcm::Pcm;
use herald_audio::{AlarmTones, AudioCache, Composer, PriorityPolicy, SynthesisError, Synthesizer};
use herald_cast::{
    CastDiscovery, CastError, CastSession, DeviceRegistry, DiscoveredDevice, DiscoveryPolicy, MediaStatus,
    PlaybackDispatcher, PlayerState,
};
use herald_server::service::AnnouncementService;
use herald_server::AppState;
use herald_types::{AudioClip, AudioFormat};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const RATE: u32 = 8_000;
pub const SPEECH_SAMPLES: usize = 1_600;
pub const SHORT_TONE_SAMPLES: usize = 800;
pub const LONG_TONE_SAMPLES: usize = 2_400;
pub const PUBLIC_URL: &str = "http://herald.test:5001";

fn sine(samples: usize, freq: f32, amplitude: f32) -> Pcm {
    Pcm::new(
        (0..samples)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect(),
        RATE,
    )
}

pub fn wav(samples: usize, freq: f32) -> AudioClip {
    sine(samples, freq, 0.2).encode_wav().unwrap()
}

/// Synthesizer that counts calls and returns a fixed WAV clip.
#[derive(Default)]
pub struct FakeSynth {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// When set, returns bytes no decoder accepts.
    pub garbage: AtomicBool,
    pub delay_ms: u64,
}

impl FakeSynth {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for FakeSynth {
    fn id(&self) -> &'static str {
        "fake"
    }

    async fn synthesize(&self, _text: &str, _language: &str, _slow: bool) -> Result<AudioClip, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SynthesisError::Engine("engine offline".to_string()));
        }
        if self.garbage.load(Ordering::SeqCst) {
            return Ok(AudioClip::new(b"not audio at all".to_vec(), AudioFormat::Wav));
        }
        Ok(wav(SPEECH_SAMPLES, 440.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Volume(f32),
    Load { url: String, content_type: String },
}

/// Device session that records every control command.
#[derive(Default)]
pub struct RecordingSession {
    pub commands: Mutex<Vec<Command>>,
    /// When set, `load` fails as if the device went away.
    pub drop_connection: AtomicBool,
}

impl RecordingSession {
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Load { url, .. } => Some(url),
                Command::Volume(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl CastSession for RecordingSession {
    fn name(&self) -> &str {
        "Kitchen"
    }

    async fn set_volume(&self, level: f32) -> Result<(), CastError> {
        self.commands.lock().unwrap().push(Command::Volume(level));
        Ok(())
    }

    async fn load(&self, url: &str, content_type: &str) -> Result<(), CastError> {
        if self.drop_connection.load(Ordering::SeqCst) {
            return Err(CastError::Bridge {
                status: 410,
                message: "session closed".to_string(),
            });
        }
        self.commands.lock().unwrap().push(Command::Load {
            url: url.to_string(),
            content_type: content_type.to_string(),
        });
        Ok(())
    }

    /// Idle until something is loaded, then playing the last load.
    async fn media_status(&self) -> Result<MediaStatus, CastError> {
        let loaded = self.loads().pop();
        Ok(MediaStatus {
            player_state: if loaded.is_some() {
                PlayerState::Playing
            } else {
                PlayerState::Idle
            },
            idle_reason: None,
            content_id: loaded,
        })
    }
}

/// Discovery that finds "Kitchen" only while `online` is set.
pub struct FakeDiscovery {
    pub online: AtomicBool,
    pub scans: AtomicUsize,
    pub session: Arc<RecordingSession>,
}

#[async_trait]
impl CastDiscovery for FakeDiscovery {
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>, CastError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![DiscoveredDevice {
            name: "Kitchen".to_string(),
            uuid: "kitchen-1".to_string(),
            address: None,
            port: None,
        }])
    }

    async fn connect(&self, _device: &DiscoveredDevice) -> Result<Arc<dyn CastSession>, CastError> {
        Ok(self.session.clone())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub synth: Arc<FakeSynth>,
    pub session: Arc<RecordingSession>,
    pub discovery: Arc<FakeDiscovery>,
    pub registry: Arc<DeviceRegistry>,
    pub state: AppState,
}

pub fn policy(max_attempts: u32) -> DiscoveryPolicy {
    DiscoveryPolicy {
        max_attempts,
        retry_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(1),
    }
}

pub async fn harness_with(synth: FakeSynth, online: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let static_dir = dir.path().join("static");
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(
        static_dir.join("emergency_alarm_short.wav"),
        wav(SHORT_TONE_SAMPLES, 880.0).bytes,
    )
    .unwrap();
    std::fs::write(
        static_dir.join("emergency_alarm_long.wav"),
        wav(LONG_TONE_SAMPLES, 660.0).bytes,
    )
    .unwrap();
    std::fs::write(static_dir.join("chime.wav"), wav(400, 523.0).bytes).unwrap();
    std::fs::write(static_dir.join("empty.wav"), wav(80, 0.0).bytes).unwrap();

    let synth = Arc::new(synth);
    let session = Arc::new(RecordingSession::default());
    let discovery = Arc::new(FakeDiscovery {
        online: AtomicBool::new(online),
        scans: AtomicUsize::new(0),
        session: session.clone(),
    });
    let registry = Arc::new(DeviceRegistry::new(discovery.clone(), "Kitchen"));
    if online {
        registry.discover(&policy(1)).await.unwrap();
    }

    let composer = Composer::new(
        PriorityPolicy::default(),
        AlarmTones::load(&static_dir, RATE),
        RATE,
    );
    let dispatcher = PlaybackDispatcher::new(Duration::from_secs(1), Duration::from_secs(1))
        .with_poll_interval(Duration::from_millis(5));
    let service = AnnouncementService::new(
        AudioCache::new(&cache_dir),
        synth.clone(),
        composer,
        registry.clone(),
        dispatcher,
        &static_dir,
    );

    let state = AppState {
        service: Arc::new(service),
        public_url: Some(PUBLIC_URL.to_string()),
        default_language: "en".to_string(),
        static_dir,
        cache_dir,
    };

    Harness {
        dir,
        synth,
        session,
        discovery,
        registry,
        state,
    }
}

pub async fn harness() -> Harness {
    harness_with(FakeSynth::default(), true).await
}

impl Harness {
    pub fn app(&self) -> Router {
        herald_server::app(self.state.clone())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send(self.app(), Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(self.app(), request).await
    }
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
