//! Playback scheduler
//!
//! One scheduler task runs the play loop:
//! - Idle: wait for a ready sink and a non-empty queue
//! - Playing: stream the track at the cursor through a pipeline into the sink
//! - Paused: nested wait on the control channel
//! - Terminated: cancellation fired, loop exited
//!
//! Idle waits wake on enqueue and fall back to the idle poll interval, so
//! the poll interval is an upper bound on wake latency, not a fixed delay.

use crate::playback::control::ControlMessage;
use crate::playback::frame::FrameReader;
use crate::playback::pipeline::{Pipeline, PipelineConfig};
use crate::playback::queue::{QueueEntry, TrackQueue};
use crate::playback::sink::{SinkSlot, TransportSink};
use crate::playback::state::{NowPlaying, SessionSettings, SharedPlaybackState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use voxq_common::events::{EventBus, PlaybackState, PlayerEvent, TrackOutcome};
use voxq_common::time::{now, remaining_secs};

/// Default upper bound on idle wake latency
pub const DEFAULT_IDLE_POLL: Duration = Duration::from_secs(1);

/// Shortest idle poll accepted; shorter values are raised to this
pub const MIN_IDLE_POLL: Duration = Duration::from_millis(10);

/// Longest a speaking-indicator update may hold up the play loop
pub const SPEAKING_UPDATE_TIMEOUT: Duration = Duration::from_millis(250);

/// How the pause wait ended
enum PauseExit {
    Resume,
    Skip,
    Cancelled,
}

/// Play loop state and collaborators
///
/// Everything here is shared with the player facade; the scheduler is the
/// only writer of the playback state.
#[derive(Clone)]
pub struct Scheduler {
    queue: TrackQueue,
    sinks: SinkSlot,
    pipeline: Arc<PipelineConfig>,
    playback: SharedPlaybackState,
    settings: Arc<SessionSettings>,
    events: EventBus,
    idle_poll: Duration,
}

impl Scheduler {
    pub fn new(
        queue: TrackQueue,
        sinks: SinkSlot,
        pipeline: Arc<PipelineConfig>,
        playback: SharedPlaybackState,
        settings: Arc<SessionSettings>,
        events: EventBus,
    ) -> Self {
        Self {
            queue,
            sinks,
            pipeline,
            playback,
            settings,
            events,
            idle_poll: DEFAULT_IDLE_POLL,
        }
    }

    /// Set the idle poll, raised to at least [`MIN_IDLE_POLL`]
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        if idle_poll < MIN_IDLE_POLL {
            warn!(
                requested_ms = idle_poll.as_millis() as u64,
                "Idle poll too short, using {}ms",
                MIN_IDLE_POLL.as_millis()
            );
        }
        self.idle_poll = idle_poll.max(MIN_IDLE_POLL);
        self
    }

    pub fn idle_poll(&self) -> Duration {
        self.idle_poll
    }

    /// Run until `cancel` fires or the control channel closes
    pub async fn run(self, cancel: CancellationToken, mut control: mpsc::Receiver<ControlMessage>) {
        info!(idle_poll_ms = self.idle_poll.as_millis() as u64, "Scheduler started");
        self.events
            .emit_lossy(PlayerEvent::SchedulerStarted { timestamp: now() });

        let mut cursor = self.playback.cursor().await;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let Some(sink) = self.sinks.ready().await else {
                trace!("Transport not ready");
                if !self.idle_wait(&cancel, &mut control, false).await {
                    break;
                }
                continue;
            };

            let Some(entry) = self.queue.checkout(&mut cursor).await else {
                if !self.idle_wait(&cancel, &mut control, true).await {
                    break;
                }
                continue;
            };

            let outcome = self
                .play_entry(&entry, sink.as_ref(), &cancel, &mut control)
                .await;

            self.events.emit_lossy(PlayerEvent::TrackFinished {
                entry_id: entry.entry_id,
                track_id: entry.track.id.clone(),
                outcome: outcome.clone(),
                timestamp: now(),
            });

            if outcome == TrackOutcome::Cancelled {
                // Interrupted track stays queued at the cursor
                break;
            }

            self.queue
                .finish(&mut cursor, entry.entry_id, self.settings.loop_queue())
                .await;
            self.events.emit_lossy(PlayerEvent::QueueChanged {
                length: self.queue.len().await,
                timestamp: now(),
            });
        }

        self.playback.set_cursor(cursor).await;
        self.transition(PlaybackState::Terminated).await;
        self.events
            .emit_lossy(PlayerEvent::SchedulerStopped { timestamp: now() });
        info!("Scheduler terminated");
    }

    /// Wait for something worth re-checking
    ///
    /// Returns `false` when the scheduler should exit. Control messages
    /// arriving while idle have no track to act on and are discarded.
    async fn idle_wait(
        &self,
        cancel: &CancellationToken,
        control: &mut mpsc::Receiver<ControlMessage>,
        wake_on_enqueue: bool,
    ) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.queue.changed(), if wake_on_enqueue => true,
            _ = tokio::time::sleep(self.idle_poll) => true,
            msg = control.recv() => match msg {
                Some(message) => {
                    debug!(%message, "Discarding control message while idle");
                    true
                }
                None => false,
            },
        }
    }

    /// Play one entry start to finish; always clears speaking and reaps
    async fn play_entry(
        &self,
        entry: &QueueEntry,
        sink: &dyn TransportSink,
        cancel: &CancellationToken,
        control: &mut mpsc::Receiver<ControlMessage>,
    ) -> TrackOutcome {
        let track = &entry.track;
        info!(entry_id = %entry.entry_id, title = %track.label(), "Starting track");

        self.playback
            .set_now_playing(Some(NowPlaying {
                entry_id: entry.entry_id,
                track: track.with_remaining(track.duration),
                started_at: now(),
            }))
            .await;

        let mut pipeline = match Pipeline::start(&self.pipeline, &track.webpage_url) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                warn!(entry_id = %entry.entry_id, error = %e, "Pipeline failed to start");
                self.playback.set_now_playing(None).await;
                return TrackOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        self.events.emit_lossy(PlayerEvent::TrackStarted {
            entry_id: entry.entry_id,
            track: track.clone(),
            announce_channel_id: self.settings.announce_channel_id().await,
            timestamp: now(),
        });
        self.transition(PlaybackState::Playing).await;

        let outcome = match pipeline.take_output() {
            Some(output) => {
                update_speaking(sink, true, cancel).await;
                let outcome = self
                    .stream_frames(FrameReader::new(output), track.duration, sink, cancel, control)
                    .await;
                update_speaking(sink, false, cancel).await;
                outcome
            }
            None => TrackOutcome::Failed {
                reason: "pipeline output unavailable".to_string(),
            },
        };

        for (stage, status) in pipeline.shutdown().await {
            trace!(%stage, ?status, "Pipeline stage exited");
        }

        self.playback.set_now_playing(None).await;
        if outcome != TrackOutcome::Cancelled {
            self.transition(PlaybackState::Idle).await;
        }

        match &outcome {
            TrackOutcome::Failed { reason } => {
                warn!(entry_id = %entry.entry_id, %reason, "Track failed")
            }
            other => info!(entry_id = %entry.entry_id, outcome = %other, "Track finished"),
        }
        outcome
    }

    /// Frame loop; cancellation and control are checked once per frame
    async fn stream_frames<R: AsyncRead + Unpin>(
        &self,
        mut frames: FrameReader<R>,
        duration_secs: u64,
        sink: &dyn TransportSink,
        cancel: &CancellationToken,
        control: &mut mpsc::Receiver<ControlMessage>,
    ) -> TrackOutcome {
        let started = Instant::now();
        let mut paused_for = Duration::ZERO;
        let mut last_remaining = duration_secs;

        loop {
            if cancel.is_cancelled() {
                return TrackOutcome::Cancelled;
            }

            match control.try_recv() {
                Ok(ControlMessage::Skip) => return TrackOutcome::Skipped,
                Ok(ControlMessage::Pause) => {
                    let paused_at = Instant::now();
                    match self.pause_wait(cancel, control).await {
                        PauseExit::Resume => paused_for += paused_at.elapsed(),
                        PauseExit::Skip => return TrackOutcome::Skipped,
                        PauseExit::Cancelled => return TrackOutcome::Cancelled,
                    }
                }
                Ok(ControlMessage::Resume) => trace!("Resume while playing ignored"),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return TrackOutcome::Cancelled,
            }

            // Neither read nor send is resumed after cancellation, so
            // abandoning them mid-way is safe.
            let frame = tokio::select! {
                _ = cancel.cancelled() => return TrackOutcome::Cancelled,
                read = frames.next_frame() => match read {
                    Ok(Some(frame)) => frame,
                    Ok(None) => return TrackOutcome::Completed,
                    Err(e) => return TrackOutcome::Failed { reason: e.to_string() },
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => return TrackOutcome::Cancelled,
                sent = sink.send(frame) => {
                    if let Err(e) = sent {
                        return TrackOutcome::Failed { reason: e.to_string() };
                    }
                }
            }

            let remaining = remaining_secs(duration_secs, started.elapsed().saturating_sub(paused_for));
            if remaining != last_remaining {
                last_remaining = remaining;
                self.playback.set_remaining(remaining).await;
            }
        }
    }

    /// Block until Resume, Skip, cancellation or a closed channel
    ///
    /// Messages are taken strictly in arrival order, so a Skip queued ahead
    /// of a Resume always wins.
    async fn pause_wait(
        &self,
        cancel: &CancellationToken,
        control: &mut mpsc::Receiver<ControlMessage>,
    ) -> PauseExit {
        self.transition(PlaybackState::Paused).await;
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PauseExit::Cancelled,
                message = control.recv() => message,
            };

            match message {
                Some(ControlMessage::Resume) => {
                    self.transition(PlaybackState::Playing).await;
                    return PauseExit::Resume;
                }
                Some(ControlMessage::Skip) => return PauseExit::Skip,
                Some(ControlMessage::Pause) => trace!("Already paused"),
                None => return PauseExit::Cancelled,
            }
        }
    }

    async fn transition(&self, new_state: PlaybackState) {
        let old_state = self.playback.set_state(new_state).await;
        if old_state != new_state {
            debug!(%old_state, %new_state, "Playback state changed");
            self.events.emit_lossy(PlayerEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: now(),
            });
        }
    }
}

/// Speaking updates never hold up shutdown
///
/// Raising the indicator is abandoned once cancellation fires. Clearing it is
/// still attempted after cancellation; both are bounded by
/// [`SPEAKING_UPDATE_TIMEOUT`] so a sink that is not being drained cannot
/// stall the loop.
async fn update_speaking(sink: &dyn TransportSink, speaking: bool, cancel: &CancellationToken) {
    let update = tokio::time::timeout(SPEAKING_UPDATE_TIMEOUT, sink.set_speaking(speaking));
    tokio::select! {
        result = update => {
            if result.is_err() {
                warn!(speaking, "Speaking update timed out");
            }
        }
        _ = cancel.cancelled(), if speaking => debug!("Speaking update abandoned on cancel"),
    }
}
