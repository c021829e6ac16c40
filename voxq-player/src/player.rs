//! Music player facade
//!
//! Owns the queue, settings and the scheduler slot and exposes the command
//! surface used by the HTTP API and by embedding hosts. Every operation is
//! safe to call concurrently with a running scheduler.

use crate::error::{Error, Result};
use crate::gateway::VoiceGateway;
use crate::playback::control::{ControlMessage, SchedulerSlot};
use crate::playback::pipeline::PipelineConfig;
use crate::playback::queue::TrackQueue;
use crate::playback::scheduler::{Scheduler, DEFAULT_IDLE_POLL};
use crate::playback::sink::{SinkSlot, TransportSink};
use crate::playback::state::{SessionSettings, SharedPlaybackState};
use crate::resolver::{validate_url, MetadataResolver};
use crate::store::PersistedState;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxq_common::config::TomlConfig;
use voxq_common::events::{EventBus, PlaybackState, PlayerEvent};
use voxq_common::time::{millis_to_duration, now};
use voxq_common::Track;

/// One row of the queue listing
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub index: usize,
    pub entry_id: Uuid,
    pub now_playing: bool,
    #[serde(flatten)]
    pub track: Track,
}

/// Result of a play request
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EnqueueSummary {
    /// Tracks appended
    pub added: usize,
    /// Resolution stopped early because the queue filled up
    pub queue_full: bool,
    pub queue_length: usize,
}

/// Settings and now-playing snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub state: PlaybackState,
    pub running: bool,
    pub guild_id: Option<String>,
    pub voice_channel_id: Option<String>,
    pub announce_channel_id: Option<String>,
    pub loop_queue: bool,
    pub max_queue_size: usize,
    pub queue_length: usize,
    pub now_playing: Option<Track>,
}

/// The player
#[derive(Clone)]
pub struct MusicPlayer {
    queue: TrackQueue,
    settings: Arc<SessionSettings>,
    playback: SharedPlaybackState,
    sinks: SinkSlot,
    scheduler: SchedulerSlot,
    resolver: Arc<MetadataResolver>,
    pipeline: Arc<PipelineConfig>,
    gateway: Arc<dyn VoiceGateway>,
    events: EventBus,
    idle_poll: Duration,
}

impl MusicPlayer {
    /// Player with default tools and no queue limit
    pub fn new(gateway: Arc<dyn VoiceGateway>, events: EventBus) -> Self {
        Self {
            queue: TrackQueue::new(0),
            settings: Arc::new(SessionSettings::new()),
            playback: SharedPlaybackState::new(),
            sinks: SinkSlot::new(),
            scheduler: SchedulerSlot::new(),
            resolver: Arc::new(MetadataResolver::default()),
            pipeline: Arc::new(PipelineConfig::default()),
            gateway,
            events,
            idle_poll: DEFAULT_IDLE_POLL,
        }
    }

    /// Player configured from the `[tools]` and `[playback]` tables
    pub fn from_config(config: &TomlConfig, gateway: Arc<dyn VoiceGateway>, events: EventBus) -> Self {
        Self::new(gateway, events)
            .with_resolver(MetadataResolver::from_tools(&config.tools))
            .with_pipeline(PipelineConfig::from_tools(&config.tools))
            .with_idle_poll(millis_to_duration(config.playback.idle_poll_ms))
            .with_max_queue_size(config.playback.max_queue_size)
    }

    pub fn with_resolver(mut self, resolver: MetadataResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn with_max_queue_size(self, max_queue_size: usize) -> Self {
        self.queue.set_max_size(max_queue_size);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Resolve `urls` and append every track they expand to
    ///
    /// All URLs are validated before anything happens; one bad URL rejects
    /// the whole request. The scheduler is started if it is not running.
    pub async fn enqueue_urls(&self, urls: &[String]) -> Result<EnqueueSummary> {
        let urls = urls
            .iter()
            .map(|u| validate_url(u))
            .collect::<Result<Vec<_>>>()?;

        self.ensure_started().await?;

        let mut summary = EnqueueSummary::default();
        'urls: for url in &urls {
            let tracks = self.resolver.resolve(url)?;
            futures::pin_mut!(tracks);

            while let Some(track) = tracks.next().await {
                match self.queue.enqueue(track).await {
                    Ok(_) => summary.added += 1,
                    Err(Error::QueueFull { max }) if summary.added > 0 => {
                        warn!(max, %url, "Queue full, dropping the rest");
                        summary.queue_full = true;
                        break 'urls;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        summary.queue_length = self.queue.len().await;
        info!(added = summary.added, queue_length = summary.queue_length, "Tracks queued");
        self.emit_queue_changed(summary.queue_length);
        Ok(summary)
    }

    pub async fn enqueue_url(&self, url: &str) -> Result<EnqueueSummary> {
        self.enqueue_urls(&[url.to_string()]).await
    }

    /// Empty the queue, returning how many entries were dropped
    pub async fn clear(&self) -> usize {
        let removed = self.queue.clear().await;
        self.emit_queue_changed(0);
        removed
    }

    /// Queue snapshot with the playing entry marked
    pub async fn list(&self) -> Vec<QueueItem> {
        let playing = self.playback.now_playing().await.map(|np| np.entry_id);
        self.queue
            .list()
            .await
            .into_iter()
            .enumerate()
            .map(|(index, entry)| QueueItem {
                index,
                now_playing: playing == Some(entry.entry_id),
                entry_id: entry.entry_id,
                track: entry.track,
            })
            .collect()
    }

    pub async fn remove_at(&self, index: usize) -> Result<Track> {
        let entry = self.queue.remove_at(index).await?;
        self.emit_queue_changed(self.queue.len().await);
        Ok(entry.track)
    }

    // ------------------------------------------------------------------
    // Scheduler control
    // ------------------------------------------------------------------

    /// Start the scheduler; `AlreadyRunning` if one is live
    pub async fn start(&self) -> Result<()> {
        let scheduler = Scheduler::new(
            self.queue.clone(),
            self.sinks.clone(),
            self.pipeline.clone(),
            self.playback.clone(),
            self.settings.clone(),
            self.events.clone(),
        )
        .with_idle_poll(self.idle_poll);

        self.scheduler
            .start(move |cancel, control| scheduler.run(cancel, control))
            .await
    }

    async fn ensure_started(&self) -> Result<()> {
        match self.start().await {
            Ok(()) | Err(Error::AlreadyRunning) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop the scheduler and wait for it to exit
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.stop().await
    }

    pub async fn skip(&self) -> Result<()> {
        self.scheduler.send(ControlMessage::Skip).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.scheduler.send(ControlMessage::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.scheduler.send(ControlMessage::Resume).await
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    pub async fn state(&self) -> PlaybackState {
        self.playback.get_state().await
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Flip loop mode, returning the new value
    pub fn toggle_loop(&self) -> bool {
        let enabled = self.settings.toggle_loop_queue();
        info!(enabled, "Queue loop toggled");
        enabled
    }

    pub async fn info(&self) -> PlayerInfo {
        PlayerInfo {
            state: self.playback.get_state().await,
            running: self.scheduler.is_running().await,
            guild_id: self.settings.guild_id().await,
            voice_channel_id: self.settings.voice_channel_id().await,
            announce_channel_id: self.settings.announce_channel_id().await,
            loop_queue: self.settings.loop_queue(),
            max_queue_size: self.queue.max_size(),
            queue_length: self.queue.len().await,
            now_playing: self.playback.now_playing().await.map(|np| np.track),
        }
    }

    /// Join a voice channel and attach its transport
    pub async fn join(&self, channel_id: &str) -> Result<()> {
        let connection = self.gateway.join(channel_id).await?;
        self.sinks.attach(connection.sink).await;
        self.settings
            .set_voice_target(Some(connection.guild_id), Some(connection.channel_id))
            .await;
        Ok(())
    }

    /// Stop playback, detach the transport and leave the voice channel
    pub async fn leave(&self) -> Result<()> {
        match self.scheduler.stop().await {
            Ok(()) | Err(Error::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.sinks.detach().await;
        self.settings.set_voice_target(None, None).await;
        self.gateway.leave().await
    }

    /// Set (or clear) the channel track announcements go to
    pub async fn set_announce_channel(&self, channel_id: Option<&str>) -> Result<()> {
        if let Some(id) = channel_id {
            self.gateway.channel_kind(id).await?;
        }
        self.settings
            .set_announce_channel_id(channel_id.map(str::to_string))
            .await;
        Ok(())
    }

    /// Attach a host-provided transport directly
    pub async fn attach_sink(&self, sink: Arc<dyn TransportSink>) {
        self.sinks.attach(sink).await;
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub async fn snapshot_state(&self) -> PersistedState {
        let announce = self.settings.announce_channel_id().await;
        PersistedState {
            queue: self.queue.tracks().await,
            guild_id: self.settings.guild_id().await,
            voice_channel_id: self.settings.voice_channel_id().await,
            text_channel_id: announce.clone(),
            loop_queue: self.settings.loop_queue(),
            announce,
            max_queue_size: self.queue.max_size(),
        }
    }

    /// Replace queue and settings with a saved state
    ///
    /// With a saved voice channel the player rejoins it and starts the
    /// scheduler. A failed rejoin is logged; the queue is still restored.
    pub async fn restore_state(&self, state: PersistedState) -> Result<()> {
        self.queue.set_max_size(state.max_queue_size);
        self.settings.set_loop_queue(state.loop_queue);
        self.settings
            .set_announce_channel_id(state.announce_channel_id().map(str::to_string))
            .await;
        self.settings
            .set_voice_target(state.guild_id.clone(), None)
            .await;
        let restored = state.queue.len();
        self.queue.replace_all(state.queue).await;
        self.emit_queue_changed(restored);
        info!(queue_length = restored, "State restored");

        let Some(channel_id) = state.voice_channel_id else {
            return Ok(());
        };

        if let Err(e) = self.join(&channel_id).await {
            warn!(%channel_id, error = %e, "Failed to rejoin voice channel");
            return Ok(());
        }
        self.ensure_started().await
    }

    fn emit_queue_changed(&self, length: usize) {
        debug!(length, "Queue changed");
        self.events.emit_lossy(PlayerEvent::QueueChanged {
            length,
            timestamp: now(),
        });
    }
}
