//! Error types for voxq-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for voxq-player
#[derive(Error, Debug)]
pub enum Error {
    /// URL rejected before resolution
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Metadata resolver could not be run
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// A pipeline stage failed to start
    #[error("Pipeline stage '{stage}' failed to start: {source}")]
    PipelineSpawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Transport sink rejected a frame
    #[error("Transport error: {0}")]
    Transport(String),

    /// Queue limit reached
    #[error("Queue is full ({max} tracks)")]
    QueueFull { max: usize },

    /// No queue entry at the requested position
    #[error("No queue entry at index {0}")]
    IndexOutOfRange(usize),

    /// Unknown channel target
    #[error("That doesn't seem to be a valid channel: {0}")]
    InvalidChannel(String),

    /// Channel exists but cannot carry audio
    #[error("That's not a voice channel: {0}")]
    NotVoiceChannel(String),

    /// Voice transport could not be established
    #[error("Error joining the channel: {0}")]
    JoinFailed(String),

    /// A scheduler is already active
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Control issued with no active scheduler
    #[error("Scheduler not running")]
    NotRunning,

    /// Persisted state encode/decode errors
    #[error("State serialization error: {0}")]
    State(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Caller supplied something unusable; nothing was mutated
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl(_) | Error::InvalidChannel(_) | Error::NotVoiceChannel(_)
        )
    }
}

/// Convenience Result type using voxq-player Error
pub type Result<T> = std::result::Result<T, Error>;
