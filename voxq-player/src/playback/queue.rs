//! Track queue with an explicit play cursor
//!
//! All reads and writes go through one mutex so a snapshot can never observe
//! a half-applied mutation. The scheduler does not hold indexes across
//! awaits: it checks an entry out through a [`PlayCursor`] and hands the
//! entry id back to [`TrackQueue::finish`], which re-locates the entry by
//! identity before advancing.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;
use voxq_common::Track;

/// Queue entry: a track plus a stable identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub entry_id: Uuid,
    pub track: Track,
}

impl QueueEntry {
    pub fn new(track: Track) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            track,
        }
    }
}

/// Scheduler read position (zero-based, "up next")
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayCursor {
    position: usize,
}

impl PlayCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// Shared, ordered track queue
#[derive(Clone)]
pub struct TrackQueue {
    entries: Arc<Mutex<Vec<QueueEntry>>>,
    /// 0 = unlimited
    max_size: Arc<AtomicUsize>,
    changed: Arc<Notify>,
}

impl TrackQueue {
    /// Create an empty queue; `max_size` of 0 disables the limit
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            max_size: Arc::new(AtomicUsize::new(max_size)),
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::Relaxed)
    }

    pub fn set_max_size(&self, max_size: usize) {
        self.max_size.store(max_size, Ordering::Relaxed);
    }

    /// Append a track, returning its entry id
    pub async fn enqueue(&self, track: Track) -> Result<Uuid> {
        let max = self.max_size();
        let mut entries = self.entries.lock().await;
        if max > 0 && entries.len() >= max {
            return Err(Error::QueueFull { max });
        }

        let entry = QueueEntry::new(track);
        let entry_id = entry.entry_id;
        debug!(%entry_id, title = %entry.track.label(), position = entries.len(), "Enqueued track");
        entries.push(entry);
        drop(entries);

        self.changed.notify_one();
        Ok(entry_id)
    }

    /// Remove everything, returning how many entries were dropped
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let removed = entries.len();
        entries.clear();
        debug!(removed, "Cleared queue");
        removed
    }

    /// Immutable snapshot for display
    pub async fn list(&self) -> Vec<QueueEntry> {
        self.entries.lock().await.clone()
    }

    /// Tracks only, in play order
    pub async fn tracks(&self) -> Vec<Track> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.track.clone())
            .collect()
    }

    /// Remove the entry at `index`, shifting later entries down
    pub async fn remove_at(&self, index: usize) -> Result<QueueEntry> {
        let mut entries = self.entries.lock().await;
        if index >= entries.len() {
            return Err(Error::IndexOutOfRange(index));
        }
        Ok(entries.remove(index))
    }

    /// Remove an entry by identity
    pub async fn remove(&self, entry_id: Uuid) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.entry_id != entry_id);
        entries.len() != before
    }

    /// Replace the whole queue (state restore); the size limit is not applied
    pub async fn replace_all(&self, tracks: Vec<Track>) {
        let mut entries = self.entries.lock().await;
        *entries = tracks.into_iter().map(QueueEntry::new).collect();
        let non_empty = !entries.is_empty();
        drop(entries);

        if non_empty {
            self.changed.notify_one();
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Resolves after the next enqueue (or immediately if one happened
    /// since the last wait)
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Entry under the cursor
    ///
    /// A cursor past the end is clamped back to the head rather than
    /// dereferenced. Returns `None` when the queue is empty.
    pub async fn checkout(&self, cursor: &mut PlayCursor) -> Option<QueueEntry> {
        let entries = self.entries.lock().await;
        if entries.is_empty() {
            return None;
        }
        if cursor.position >= entries.len() {
            debug!(
                cursor = cursor.position,
                len = entries.len(),
                "Cursor past end of queue, wrapping to head"
            );
            cursor.position = 0;
        }
        entries.get(cursor.position).cloned()
    }

    /// Advance after `entry_id` finished playing (completed, skipped or failed)
    ///
    /// Loop mode leaves the queue untouched and moves the cursor just past
    /// the finished entry, wrapping to 0. Otherwise the finished entry is
    /// removed and the cursor stays on its index, which now holds the next
    /// entry. If the entry vanished meanwhile (clear/remove) nothing else is
    /// removed and the cursor is left for `checkout` to clamp.
    pub async fn finish(&self, cursor: &mut PlayCursor, entry_id: Uuid, loop_queue: bool) {
        let mut entries = self.entries.lock().await;
        let Some(index) = entries.iter().position(|e| e.entry_id == entry_id) else {
            debug!(%entry_id, "Finished entry no longer queued");
            return;
        };

        if loop_queue {
            cursor.position = if index + 1 >= entries.len() {
                0
            } else {
                index + 1
            };
        } else {
            entries.remove(index);
            cursor.position = index;
        }
    }
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new(0)
    }
}
