mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_play_static_asset() {
    let h = harness().await;

    let (status, body) = h.get("/play/chime.wav").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file"], "chime.wav");
    assert_eq!(
        h.session.commands(),
        vec![Command::Load {
            url: format!("{PUBLIC_URL}/static/chime.wav"),
            content_type: "audio/wav".to_string(),
        }]
    );
    assert_eq!(h.synth.calls(), 0);
}

#[tokio::test]
async fn test_play_missing_asset_is_404() {
    let h = harness().await;

    for uri in ["/play/nope.wav", "/play/..%2Fsecret.wav", "/play/chime.txt"] {
        let (status, body) = h.get(uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}: {body}");
    }
    assert!(h.session.commands().is_empty());
}

#[tokio::test]
async fn test_play_with_device_down_is_503() {
    let h = harness_with(FakeSynth::default(), false).await;

    let (status, _) = h.get("/play/chime.wav").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_reports_ready_device() {
    let h = harness().await;

    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["device"]["name"], "Kitchen");
    assert_eq!(body["device"]["state"], "ready");
    assert!(body["device"]["last_error"].is_null());
}

#[tokio::test]
async fn test_health_unhealthy_after_discovery_exhausted() {
    let h = harness_with(FakeSynth::default(), false).await;
    h.registry.discover(&policy(5)).await.unwrap_err();

    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["device"]["state"], "failed");
    assert!(body["device"]["last_error"].as_str().unwrap().contains("not found"));

    // Rediscovery brings it back.
    h.discovery.online.store(true, Ordering::SeqCst);
    h.registry.discover(&policy(1)).await.unwrap();
    let (status, _) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_lost_session_is_reported_and_not_retried() {
    let h = harness().await;
    h.session.drop_connection.store(true, Ordering::SeqCst);

    let (status, body) = h.get("/announce?text=hello").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("playback failed"));
    assert!(h.session.commands().is_empty());

    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["device"]["state"], "failed");

    // The clip was still cached before dispatch failed.
    let (status, _) = h.get("/announce?text=hello").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.synth.calls(), 1);
}

#[tokio::test]
async fn test_media_is_served_for_the_device() {
    let h = harness().await;

    let (_, body) = h.get("/announce?text=hello").await;
    let url = body["media_url"].as_str().unwrap();
    let path = url.strip_prefix(PUBLIC_URL).unwrap().to_string();
    assert!(path.starts_with("/cache/"));

    let response = tower::ServiceExt::oneshot(
        h.app(),
        Request::builder().uri(&path).body(Body::empty()).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = tower::ServiceExt::oneshot(
        h.app(),
        Request::builder()
            .uri("/static/emergency_alarm_long.wav")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_host_header_is_used_without_public_url() {
    let mut h = harness().await;
    h.state.public_url = None;

    let request = Request::builder()
        .uri("/play/chime.wav")
        .header("host", "192.168.1.20:5001")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.app(), request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["media_url"], "http://192.168.1.20:5001/static/chime.wav");
}
