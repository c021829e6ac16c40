//! Event types for the voxq event system
//!
//! Provides the shared event definitions and the EventBus used to fan
//! playback events out to SSE clients and announcers.

use crate::track::Track;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Scheduler playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No track playing; waiting for queue content or a ready transport
    Idle,
    Playing,
    Paused,
    /// Cancellation fired; the scheduler loop has exited
    Terminated,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Terminated => write!(f, "terminated"),
        }
    }
}

/// How a single track's play routine ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TrackOutcome {
    /// Clean end of stream
    Completed,
    /// Skip control message
    Skipped,
    /// Spawn failure, truncated frame, read or send error
    Failed { reason: String },
    /// Cancellation signal or closed control channel
    Cancelled,
}

impl TrackOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TrackOutcome::Failed { .. })
    }
}

impl std::fmt::Display for TrackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackOutcome::Completed => write!(f, "completed"),
            TrackOutcome::Skipped => write!(f, "skipped"),
            TrackOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            TrackOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// voxq event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Scheduler task spawned
    SchedulerStarted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduler loop exited after cancellation
    SchedulerStopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback state changed
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track pipeline started and frames are about to flow
    ///
    /// Carries the configured announce channel so listeners can post a
    /// "now playing" notice there.
    TrackStarted {
        entry_id: Uuid,
        track: Track,
        announce_channel_id: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track play routine returned
    TrackFinished {
        entry_id: Uuid,
        track_id: String,
        outcome: TrackOutcome,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        length: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::SchedulerStarted { .. } => "SchedulerStarted",
            PlayerEvent::SchedulerStopped { .. } => "SchedulerStopped",
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::TrackStarted { .. } => "TrackStarted",
            PlayerEvent::TrackFinished { .. } => "TrackFinished",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
        }
    }
}

/// Central event distribution bus
///
/// Wraps tokio::broadcast: publishing never blocks, slow subscribers lag
/// and drop old events, and dropped subscribers clean up automatically.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("No subscribers for {}", e.0.event_type());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
