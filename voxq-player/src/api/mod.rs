//! HTTP control API
//!
//! Health at the root, everything else under `/api/v1`.

pub mod handlers;
pub mod sse;

use crate::player::MusicPlayer;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppContext {
    pub player: MusicPlayer,
    /// Root folder path, reported by /health
    pub root_folder: String,
    pub port: u16,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                // Queue
                .route("/music/queue", get(handlers::list_queue))
                .route("/music/queue/clear", post(handlers::clear_queue))
                .route("/music/queue/:index", delete(handlers::remove_from_queue))
                .route("/music/play", post(handlers::play))
                // Scheduler control
                .route("/music/start", post(handlers::start))
                .route("/music/stop", post(handlers::stop))
                .route("/music/skip", post(handlers::skip))
                .route("/music/pause", post(handlers::pause))
                .route("/music/resume", post(handlers::resume))
                // Settings
                .route("/music/info", get(handlers::info))
                .route("/music/loop", post(handlers::toggle_loop))
                .route("/music/join", post(handlers::join))
                .route("/music/leave", post(handlers::leave))
                .route("/music/announce", post(handlers::set_announce))
                // SSE
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
