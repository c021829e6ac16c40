//! Integration tests for the voxq player HTTP API
//!
//! Drives the router with `oneshot` requests:
//! - Health check
//! - Queue management
//! - Scheduler control with and without a running scheduler
//! - Channel and settings endpoints

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use voxq_common::config::{ChannelConfig, ChannelKind};
use voxq_common::events::EventBus;
use voxq_player::api::{create_router, AppContext};
use voxq_player::gateway::StaticGateway;
use voxq_player::resolver::MetadataResolver;
use voxq_player::MusicPlayer;

fn channels() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            id: "voice-1".into(),
            guild_id: "guild-1".into(),
            kind: ChannelKind::Voice,
            sink_addr: Some("127.0.0.1:9".into()),
        },
        ChannelConfig {
            id: "text-1".into(),
            guild_id: "guild-1".into(),
            kind: ChannelKind::Text,
            sink_addr: None,
        },
    ]
}

/// Test helper to create a router around a fresh player
fn setup_test_server() -> (axum::Router, MusicPlayer) {
    let one = r#"{"id":"one","title":"One","webpage_url":"https://example.com/1","duration":5}"#;
    let two = r#"{"id":"two","title":"Two","webpage_url":"https://example.com/2","duration":7}"#;

    let player = MusicPlayer::new(Arc::new(StaticGateway::new(channels())), EventBus::new(64))
        .with_resolver(MetadataResolver::new("printf", ["%s\\n%s\\n", one, two]))
        .with_idle_poll(Duration::from_millis(20));

    let router = create_router(AppContext {
        player: player.clone(),
        root_folder: "/tmp/voxq-test".to_string(),
        port: 5750,
    });
    (router, player)
}

/// Helper function to make HTTP requests to the test router
async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup_test_server();
    let (status, body) = make_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "voxq-player");
    assert_eq!(body["port"], 5750);
}

#[tokio::test]
async fn test_empty_queue() {
    let (app, _) = setup_test_server();
    let (status, body) = make_request(&app, Method::GET, "/api/v1/music/queue", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_play_list_remove_clear() {
    let (app, player) = setup_test_server();

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/play",
        Some(json!({ "urls": ["https://example.com/playlist"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 2);
    assert_eq!(body["queue_length"], 2);

    let (_, body) = make_request(&app, Method::GET, "/api/v1/music/queue", None).await;
    let queue = body["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0]["id"], "one");
    assert_eq!(queue[1]["index"], 1);
    assert_eq!(queue[1]["now_playing"], false);

    let (status, body) = make_request(&app, Method::DELETE, "/api/v1/music/queue/0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "one");

    let (status, _) = make_request(&app, Method::DELETE, "/api/v1/music/queue/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = make_request(&app, Method::POST, "/api/v1/music/queue/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    player.stop().await.unwrap();
}

#[tokio::test]
async fn test_play_rejects_invalid_input() {
    let (app, player) = setup_test_server();

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/play",
        Some(json!({ "urls": ["not-a-url"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/play",
        Some(json!({ "urls": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was started or queued
    assert!(!player.is_running().await);
    assert_eq!(player.queue().len().await, 0);
}

#[tokio::test]
async fn test_controls_without_scheduler_are_noops() {
    let (app, _) = setup_test_server();

    for action in ["stop", "skip", "pause", "resume"] {
        let path = format!("/api/v1/music/{}", action);
        let (status, body) = make_request(&app, Method::POST, &path, None).await;
        assert_eq!(status, StatusCode::OK, "{}", action);
        assert_eq!(body["status"], "not running", "{}", action);
    }
}

#[tokio::test]
async fn test_start_stop_cycle() {
    let (app, player) = setup_test_server();

    let (status, body) = make_request(&app, Method::POST, "/api/v1/music/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, body) = make_request(&app, Method::POST, "/api/v1/music/start", None).await;
    assert_eq!(body["status"], "already running");

    let (_, body) = make_request(&app, Method::POST, "/api/v1/music/skip", None).await;
    assert_eq!(body["status"], "ok");

    let (_, body) = make_request(&app, Method::POST, "/api/v1/music/stop", None).await;
    assert_eq!(body["status"], "ok");
    assert!(!player.is_running().await);

    let (_, body) = make_request(&app, Method::GET, "/api/v1/music/info", None).await;
    assert_eq!(body["state"], "terminated");
    assert_eq!(body["running"], false);
}

#[tokio::test]
async fn test_join_and_leave() {
    let (app, _) = setup_test_server();

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/join",
        Some(json!({ "channel_id": "text-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/join",
        Some(json!({ "channel_id": "nowhere" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(&app, Method::POST, "/api/v1/music/join", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/join",
        Some(json!({ "channel_id": "voice-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = make_request(&app, Method::GET, "/api/v1/music/info", None).await;
    assert_eq!(info["guild_id"], "guild-1");
    assert_eq!(info["voice_channel_id"], "voice-1");

    let (status, _) = make_request(&app, Method::POST, "/api/v1/music/leave", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = make_request(&app, Method::GET, "/api/v1/music/info", None).await;
    assert_eq!(info["voice_channel_id"], Value::Null);
}

#[tokio::test]
async fn test_loop_and_announce_settings() {
    let (app, _) = setup_test_server();

    let (_, body) = make_request(&app, Method::POST, "/api/v1/music/loop", None).await;
    assert_eq!(body["loop_queue"], true);
    let (_, body) = make_request(&app, Method::POST, "/api/v1/music/loop", None).await;
    assert_eq!(body["loop_queue"], false);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/announce",
        Some(json!({ "channel_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/v1/music/announce",
        Some(json!({ "channel_id": "text-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = make_request(&app, Method::GET, "/api/v1/music/info", None).await;
    assert_eq!(info["announce_channel_id"], "text-1");
    assert_eq!(info["loop_queue"], false);
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _) = setup_test_server();
    let (status, _) = make_request(&app, Method::GET, "/api/v1/music/volume", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
