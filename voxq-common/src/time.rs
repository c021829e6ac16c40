//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Whole seconds left of a `duration_secs` long track after `played`
pub fn remaining_secs(duration_secs: u64, played: Duration) -> u64 {
    duration_secs.saturating_sub(played.as_secs())
}
