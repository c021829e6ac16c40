//! Playback state management
//!
//! The scheduler is the only writer; command handlers read through the
//! accessors below and always get an owned snapshot, never a reference into
//! scheduler-owned data.

use crate::playback::queue::PlayCursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use voxq_common::events::PlaybackState;
use voxq_common::Track;

/// Currently playing track snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    /// Queue entry being played
    pub entry_id: Uuid,
    /// Track with `remaining` kept current
    pub track: Track,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Shared playback state
#[derive(Debug, Clone)]
pub struct SharedPlaybackState {
    inner: Arc<RwLock<PlaybackStateInner>>,
}

#[derive(Debug)]
struct PlaybackStateInner {
    state: PlaybackState,
    now_playing: Option<NowPlaying>,
    /// Where the next scheduler run picks up
    cursor: PlayCursor,
}

impl SharedPlaybackState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(PlaybackStateInner {
                state: PlaybackState::Idle,
                now_playing: None,
                cursor: PlayCursor::new(),
            })),
        }
    }

    pub async fn get_state(&self) -> PlaybackState {
        self.inner.read().await.state
    }

    /// Set the state, returning the previous one
    pub async fn set_state(&self, state: PlaybackState) -> PlaybackState {
        std::mem::replace(&mut self.inner.write().await.state, state)
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.inner.read().await.now_playing.clone()
    }

    pub async fn set_now_playing(&self, now_playing: Option<NowPlaying>) {
        self.inner.write().await.now_playing = now_playing;
    }

    pub async fn cursor(&self) -> PlayCursor {
        self.inner.read().await.cursor
    }

    pub async fn set_cursor(&self, cursor: PlayCursor) {
        self.inner.write().await.cursor = cursor;
    }

    /// Update `remaining` on the now-playing snapshot, if any
    pub async fn set_remaining(&self, remaining: u64) {
        if let Some(np) = self.inner.write().await.now_playing.as_mut() {
            np.track.remaining = remaining;
        }
    }
}

impl Default for SharedPlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Player settings read by the scheduler and persisted with the queue
#[derive(Debug, Default)]
pub struct SessionSettings {
    loop_queue: AtomicBool,
    guild_id: RwLock<Option<String>>,
    voice_channel_id: RwLock<Option<String>>,
    announce_channel_id: RwLock<Option<String>>,
}

impl SessionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loop_queue(&self) -> bool {
        self.loop_queue.load(Ordering::Relaxed)
    }

    pub fn set_loop_queue(&self, enabled: bool) {
        self.loop_queue.store(enabled, Ordering::Relaxed);
    }

    /// Flip loop mode, returning the new value
    pub fn toggle_loop_queue(&self) -> bool {
        !self.loop_queue.fetch_xor(true, Ordering::Relaxed)
    }

    pub async fn guild_id(&self) -> Option<String> {
        self.guild_id.read().await.clone()
    }

    pub async fn voice_channel_id(&self) -> Option<String> {
        self.voice_channel_id.read().await.clone()
    }

    /// Record the joined voice channel (or clear it with `None`)
    pub async fn set_voice_target(&self, guild_id: Option<String>, channel_id: Option<String>) {
        *self.guild_id.write().await = guild_id;
        *self.voice_channel_id.write().await = channel_id;
    }

    pub async fn announce_channel_id(&self) -> Option<String> {
        self.announce_channel_id.read().await.clone()
    }

    pub async fn set_announce_channel_id(&self, channel_id: Option<String>) {
        *self.announce_channel_id.write().await = channel_id;
    }
}
