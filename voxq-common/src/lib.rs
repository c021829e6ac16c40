//! # voxq Common Library
//!
//! Shared code for the voxq crates:
//! - Track metadata record
//! - Event types (PlayerEvent enum) and the EventBus
//! - Configuration loading and root folder resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod track;

pub use error::{Error, Result};
pub use track::Track;
