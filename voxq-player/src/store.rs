//! Persisted player state
//!
//! The record keeps the field names of earlier state files so they load
//! unchanged. Empty strings in those files mean "unset".

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use voxq_common::Track;

/// State file name under the root folder
pub const STATE_FILE_NAME: &str = "voxq-state.json";

/// Queue contents and settings that survive a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    #[serde(rename = "Queue", deserialize_with = "null_as_default")]
    pub queue: Vec<Track>,

    #[serde(rename = "GuildID", deserialize_with = "empty_as_none")]
    pub guild_id: Option<String>,

    /// Present means "rejoin and start playing on load"
    #[serde(rename = "VoiceChannelID", deserialize_with = "empty_as_none")]
    pub voice_channel_id: Option<String>,

    #[serde(rename = "TextChannelID", deserialize_with = "empty_as_none")]
    pub text_channel_id: Option<String>,

    #[serde(rename = "LoopQueue")]
    pub loop_queue: bool,

    /// Announce channel
    #[serde(rename = "Announce", deserialize_with = "empty_as_none")]
    pub announce: Option<String>,

    /// 0 = unlimited
    #[serde(rename = "MaxQueueSize")]
    pub max_queue_size: usize,
}

impl PersistedState {
    /// Announce channel, falling back to the text channel of older files
    pub fn announce_channel_id(&self) -> Option<&str> {
        self.announce
            .as_deref()
            .or(self.text_channel_id.as_deref())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON file holding one [`PersistedState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at `<root_folder>/voxq-state.json`
    pub fn new(root_folder: &Path) -> Self {
        Self::at(root_folder.join(STATE_FILE_NAME))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state
    ///
    /// A missing or unreadable file yields `None`; startup continues with
    /// an empty player either way.
    pub async fn load(&self) -> Option<PersistedState> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved state");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read saved state");
                return None;
            }
        };

        match serde_json::from_slice::<PersistedState>(&data) {
            Ok(state) => {
                info!(
                    path = %self.path.display(),
                    queue_length = state.queue.len(),
                    "Loaded saved state"
                );
                Some(state)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed saved state");
                None
            }
        }
    }

    /// Write the state through a temp file and rename it into place
    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), queue_length = state.queue.len(), "State saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PersistedState {
        PersistedState {
            queue: vec![Track {
                id: "a".into(),
                title: "A".into(),
                webpage_url: "https://x/a".into(),
                duration: 30,
                ..Default::default()
            }],
            guild_id: Some("g".into()),
            voice_channel_id: Some("v".into()),
            text_channel_id: None,
            loop_queue: true,
            announce: Some("t".into()),
            max_queue_size: 25,
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await, Some(sample()));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_and_malformed_files_load_as_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.load().await.is_none());

        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::at(dir.path().join("nested/deeper/state.json"));
        store.save(&PersistedState::default()).await.unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_legacy_record_field_names() {
        let json = r#"{
            "Queue": [{"id":"x","title":"X","webpage_url":"https://x/x","duration":12,"Remaining":0}],
            "GuildID": "g1",
            "VoiceChannelID": "",
            "TextChannelID": "t1",
            "LoopQueue": false,
            "Announce": "",
            "MaxQueueSize": 0
        }"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.guild_id.as_deref(), Some("g1"));
        assert!(state.voice_channel_id.is_none());
        assert_eq!(state.announce_channel_id(), Some("t1"));
    }

    #[test]
    fn test_null_queue_is_empty() {
        let state: PersistedState = serde_json::from_str(r#"{"Queue": null}"#).unwrap();
        assert!(state.queue.is_empty());
        assert_eq!(state, PersistedState::default());
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        for key in [
            "Queue",
            "GuildID",
            "VoiceChannelID",
            "TextChannelID",
            "LoopQueue",
            "Announce",
            "MaxQueueSize",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }
}
