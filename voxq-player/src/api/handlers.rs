//! HTTP request handlers

use crate::api::AppContext;
use crate::error::Error;
use crate::player::{EnqueueSummary, PlayerInfo, QueueItem};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use voxq_common::Track;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
    root_folder: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn new(status: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: status.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    queue: Vec<QueueItem>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    removed: usize,
}

#[derive(Debug, Serialize)]
pub struct LoopResponse {
    loop_queue: bool,
}

type ApiError = (StatusCode, Json<StatusResponse>);

/// Map a player error onto a status code
fn api_error(e: Error) -> ApiError {
    let status = match &e {
        e if e.is_invalid_input() => StatusCode::BAD_REQUEST,
        Error::IndexOutOfRange(_) => StatusCode::NOT_FOUND,
        Error::QueueFull { .. } | Error::AlreadyRunning => StatusCode::CONFLICT,
        Error::JoinFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (status, StatusResponse::new(format!("error: {}", e)))
}

/// Control result where "no scheduler" is a no-op, not a failure
fn control_response(result: crate::error::Result<()>) -> Result<Json<StatusResponse>, ApiError> {
    match result {
        Ok(()) => Ok(StatusResponse::new("ok")),
        Err(Error::NotRunning) => Ok(StatusResponse::new("not running")),
        Err(e) => Err(api_error(e)),
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "voxq-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
        root_folder: ctx.root_folder.clone(),
    })
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /music/queue
pub async fn list_queue(State(ctx): State<AppContext>) -> Json<QueueResponse> {
    Json(QueueResponse {
        queue: ctx.player.list().await,
    })
}

/// POST /music/play - Resolve URLs and queue their tracks
pub async fn play(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<EnqueueSummary>, ApiError> {
    info!("Play request for {} URL(s)", req.urls.len());
    if req.urls.is_empty() {
        return Err((StatusCode::BAD_REQUEST, StatusResponse::new("error: no URLs given")));
    }

    ctx.player
        .enqueue_urls(&req.urls)
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /music/queue/clear
pub async fn clear_queue(State(ctx): State<AppContext>) -> Json<ClearResponse> {
    let removed = ctx.player.clear().await;
    info!("Queue cleared ({} entries)", removed);
    Json(ClearResponse { removed })
}

/// DELETE /music/queue/:index
pub async fn remove_from_queue(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> Result<Json<Track>, ApiError> {
    ctx.player.remove_at(index).await.map(Json).map_err(api_error)
}

// ============================================================================
// Scheduler Control Endpoints
// ============================================================================

/// POST /music/start
pub async fn start(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    match ctx.player.start().await {
        Ok(()) => Ok(StatusResponse::new("ok")),
        Err(Error::AlreadyRunning) => Ok(StatusResponse::new("already running")),
        Err(e) => Err(api_error(e)),
    }
}

/// POST /music/stop
pub async fn stop(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    control_response(ctx.player.stop().await)
}

/// POST /music/skip
pub async fn skip(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    control_response(ctx.player.skip().await)
}

/// POST /music/pause
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    control_response(ctx.player.pause().await)
}

/// POST /music/resume
pub async fn resume(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    control_response(ctx.player.resume().await)
}

// ============================================================================
// Settings Endpoints
// ============================================================================

/// GET /music/info
pub async fn info(State(ctx): State<AppContext>) -> Json<PlayerInfo> {
    Json(ctx.player.info().await)
}

/// POST /music/loop
pub async fn toggle_loop(State(ctx): State<AppContext>) -> Json<LoopResponse> {
    Json(LoopResponse {
        loop_queue: ctx.player.toggle_loop(),
    })
}

/// POST /music/join
pub async fn join(
    State(ctx): State<AppContext>,
    Json(req): Json<ChannelRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Some(channel_id) = req.channel_id else {
        return Err((
            StatusCode::BAD_REQUEST,
            StatusResponse::new("error: channel_id is required"),
        ));
    };

    ctx.player.join(&channel_id).await.map_err(api_error)?;
    info!("Joined voice channel {}", channel_id);
    Ok(StatusResponse::new("ok"))
}

/// POST /music/leave
pub async fn leave(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    ctx.player.leave().await.map_err(api_error)?;
    Ok(StatusResponse::new("ok"))
}

/// POST /music/announce - Set or clear (null) the announce channel
pub async fn set_announce(
    State(ctx): State<AppContext>,
    Json(req): Json<ChannelRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    ctx.player
        .set_announce_channel(req.channel_id.as_deref())
        .await
        .map_err(api_error)?;
    Ok(StatusResponse::new("ok"))
}
