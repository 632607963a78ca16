//! HTTP handlers for announcements, asset playback, and health.

use crate::service::{AnnounceError, ClipSource, Outcome};
use crate::AppState;
use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use herald_types::{AnnouncementRequest, ConnectionState, DeviceHandle, Priority, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the API, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Announce(#[from] AnnounceError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Announce(AnnounceError::Validation(e))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Announce(e) => match e {
                AnnounceError::Validation(_) => StatusCode::BAD_REQUEST,
                AnnounceError::AssetNotFound(_) => StatusCode::NOT_FOUND,
                AnnounceError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                AnnounceError::Synthesis(_) | AnnounceError::Playback(_) => StatusCode::BAD_GATEWAY,
                AnnounceError::Composition(_) | AnnounceError::CacheWrite(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

/// A boolean given as JSON `true` or as a query string like `1` or `yes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn parse(&self) -> Result<bool, ApiError> {
        match self {
            Flag::Bool(b) => Ok(*b),
            Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "" | "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ApiError::BadRequest(format!("invalid boolean: {other:?}"))),
            },
        }
    }
}

/// An integer given as a JSON number or as a query string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Text(String),
}

impl Number {
    fn parse(&self) -> Result<i64, ApiError> {
        match self {
            Number::Int(n) => Ok(*n),
            Number::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid integer: {s:?}"))),
        }
    }
}

/// Query or body of an announcement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnounceParams {
    pub text: Option<String>,
    #[serde(alias = "lang")]
    pub language: Option<String>,
    pub slow: Option<Flag>,
    pub priority: Option<Number>,
}

#[derive(Debug, Serialize)]
pub struct AnnounceResponse {
    pub text: String,
    pub priority: u8,
    pub media_url: String,
    pub source: ClipSource,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub file: String,
    pub media_url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub device: DeviceHandle,
    pub version: &'static str,
}

impl AnnounceParams {
    fn into_request(self, state: &AppState, default_priority: Priority) -> Result<AnnouncementRequest, ApiError> {
        let text = self
            .text
            .ok_or_else(|| ApiError::from(ValidationError::EmptyText))?;
        let language = self
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| state.default_language.clone());
        let slow = self.slow.as_ref().map(Flag::parse).transpose()?.unwrap_or(false);
        let priority = match self.priority.as_ref().map(Number::parse).transpose()? {
            Some(n) => u8::try_from(n)
                .map_err(|_| ValidationError::PriorityOutOfRange(n))
                .and_then(Priority::try_from)?,
            None => default_priority,
        };

        Ok(AnnouncementRequest::new(&text, &language, slow, priority)?)
    }
}

/// Scheme and authority the device should fetch media from.
fn base_url(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    if let Some(url) = &state.public_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(|host| format!("http://{host}"))
        .ok_or_else(|| ApiError::BadRequest("missing Host header and no public_url configured".to_string()))
}

async fn announce(
    state: &AppState,
    headers: &HeaderMap,
    params: AnnounceParams,
    default_priority: Priority,
) -> Result<Json<AnnounceResponse>, ApiError> {
    let request = params.into_request(state, default_priority)?;
    let base = base_url(state, headers)?;

    // Detached from the handler: a caller hanging up must not cancel an
    // alarm halfway through synthesis or between volume and load.
    let service = state.service.clone();
    let job = request.clone();
    let Outcome { media_url, source, .. } = tokio::spawn(async move { service.announce(&job, &base).await })
        .await
        .map_err(|e| ApiError::Internal(format!("task join error: {}", e)))??;

    Ok(Json(AnnounceResponse {
        text: request.text().to_string(),
        priority: request.priority().as_u8(),
        media_url,
        source,
    }))
}

/// Handler for `GET /announce`.
pub async fn announce_query_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AnnounceParams>,
) -> Result<Json<AnnounceResponse>, ApiError> {
    announce(&state, &headers, params, Priority::Normal).await
}

/// Handler for `POST /announce` with a JSON body.
pub async fn announce_json_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(params): Json<AnnounceParams>,
) -> Result<Json<AnnounceResponse>, ApiError> {
    announce(&state, &headers, params, Priority::Normal).await
}

/// Handler for `GET /say`: always priority 0.
pub async fn say_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AnnounceParams>,
) -> Result<Json<AnnounceResponse>, ApiError> {
    let params = AnnounceParams {
        priority: None,
        ..params
    };
    announce(&state, &headers, params, Priority::Normal).await
}

/// Handler for `GET /alarm`: priority defaults to 1.
pub async fn alarm_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<AnnounceParams>,
) -> Result<Json<AnnounceResponse>, ApiError> {
    announce(&state, &headers, params, Priority::Alert).await
}

/// Handler for `GET /play/{filename}`.
pub async fn play_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> Result<Json<PlayResponse>, ApiError> {
    let base = base_url(&state, &headers)?;
    let service = state.service.clone();
    let name = filename.clone();
    let outcome = tokio::spawn(async move { service.play_by_name(&name, &base).await })
        .await
        .map_err(|e| ApiError::Internal(format!("task join error: {}", e)))??;
    Ok(Json(PlayResponse {
        file: filename,
        media_url: outcome.media_url,
    }))
}

/// Handler for `GET /health`.
///
/// `200` while the device is `Ready`, `503` otherwise.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let device = state.service.device();
    let (code, status) = match device.state {
        ConnectionState::Ready => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };
    (
        code,
        Json(HealthResponse {
            status,
            device,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
