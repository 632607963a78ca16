//! Herald server library logic.

pub mod api;
pub mod background;
pub mod config;
pub mod service;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Extension, Router,
};
use config::Config;
use herald_audio::{build_synthesizer, AlarmTones, AudioCache, Composer, PriorityPolicy};
use herald_cast::DeviceRegistry;
use service::{AnnouncementService, CACHE_ROUTE, STATIC_ROUTE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Maximum request body size (64 KiB). Announcements are short text.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The announcement pipeline.
    pub service: Arc<AnnouncementService>,
    /// Base URL given to the device, overriding the request `Host`.
    pub public_url: Option<String>,
    /// Language used when a request names none.
    pub default_language: String,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
    /// Directory served under `/cache`.
    pub cache_dir: PathBuf,
}

impl AppState {
    /// Wires the production pipeline from configuration.
    ///
    /// Alarm tones are decoded here, once. The returned registry starts
    /// `Disconnected`; run [`background::run_discovery`] to bring it up.
    pub fn from_config(config: &Config) -> Self {
        let static_dir = PathBuf::from(&config.audio.static_dir);
        let cache_dir = PathBuf::from(&config.audio.cache_dir);
        let mixing = &config.audio.mixing;

        let composer = Composer::new(
            PriorityPolicy::with_gains(mixing.pre_gain_db, mixing.post_gain_db),
            AlarmTones::load(&static_dir, mixing.sample_rate),
            mixing.sample_rate,
        );
        let registry = Arc::new(DeviceRegistry::new(
            Arc::new(config.device.bridge()),
            &config.device.name,
        ));
        let service = AnnouncementService::new(
            AudioCache::new(&cache_dir),
            build_synthesizer(&config.tts),
            composer,
            registry,
            config.device.dispatcher(),
            &static_dir,
        )
        .with_alarm_volume(config.device.alarm_volume);

        Self {
            service: Arc::new(service),
            public_url: config.server.public_url.clone(),
            default_language: config.tts.default_language.clone(),
            static_dir,
            cache_dir,
        }
    }
}

fn serve_dir(router: Router, route: &str, dir: &Path) -> Router {
    if !dir.exists() {
        tracing::warn!(path = %dir.display(), route, "directory not found yet, serving anyway");
    }
    router.nest_service(route, ServeDir::new(dir))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route(
            "/announce",
            get(api::announce_query_handler).post(api::announce_json_handler),
        )
        .route("/say", get(api::say_handler))
        .route("/alarm", get(api::alarm_handler))
        .route("/play/{filename}", get(api::play_handler))
        .route("/health", get(api::health_handler));

    // The device fetches the clips it is told to play from these.
    let router = serve_dir(router, STATIC_ROUTE, &state.static_dir);
    let router = serve_dir(router, CACHE_ROUTE, &state.cache_dir);

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
