//! # voxq Player Library (voxq-player)
//!
//! Queue-driven voice-channel music player.
//!
//! **Purpose:** Resolve track URLs into metadata, keep the play queue, and
//! stream each track through a fetch → transcode → encode process pipeline
//! into a frame transport, with an HTTP/SSE control interface.
//!
//! **Architecture:** One scheduler task per player, controlled through a
//! cancellation token and a control channel; the queue is the only state
//! shared under a lock on every access.

pub mod api;
pub mod error;
pub mod gateway;
pub mod playback;
pub mod player;
pub mod resolver;
pub mod store;

pub use error::{Error, Result};
pub use player::MusicPlayer;
