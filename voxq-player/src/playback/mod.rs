//! Playback subsystem
//!
//! Queue and cursor, the scheduler with its control slot, the per-track
//! process pipeline, frame reading and the transport sinks frames go to.

pub mod control;
pub mod frame;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod sink;
pub mod state;

pub use control::{ControlMessage, SchedulerSlot};
pub use pipeline::{Pipeline, PipelineConfig, RunningPipeline, Stage};
pub use queue::{PlayCursor, QueueEntry, TrackQueue};
pub use scheduler::Scheduler;
pub use sink::{ChannelSink, SinkEvent, SinkSlot, TransportSink, UdpSink};
pub use state::{NowPlaying, SessionSettings, SharedPlaybackState};
