//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "VOXQ_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "VOXQ_CONFIG";

/// Top-level TOML configuration file
///
/// Every key is optional; absent sections fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding persisted player state
    pub root_folder: Option<PathBuf>,
    /// HTTP control API port
    pub port: Option<u16>,
    /// Tracing filter directive (e.g. "info" or "voxq_player=debug")
    pub log_level: Option<String>,
    pub tools: ToolsConfig,
    pub playback: PlaybackConfig,
    pub channels: Vec<ChannelConfig>,
}

/// External programs driven by the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Metadata resolver (JSON-per-line output)
    pub resolver: String,
    /// Fetch stage (raw best-audio stream on stdout)
    pub fetch: String,
    /// Transcode stage (s16le 48 kHz stereo PCM on stdout)
    pub transcode: String,
    /// Encode stage (length-prefixed frames on stdout)
    pub encode: String,
    /// Format selector handed to the fetch stage
    pub format_selector: String,
    /// Ask the encode stage for raw framing
    pub raw_framing: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            resolver: "yt-dlp".to_string(),
            fetch: "yt-dlp".to_string(),
            transcode: "ffmpeg".to_string(),
            encode: "dca".to_string(),
            format_selector: "bestaudio".to_string(),
            raw_framing: true,
        }
    }
}

/// Scheduler and queue tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Upper bound on idle wakeup latency
    pub idle_poll_ms: u64,
    /// 0 = unlimited
    pub max_queue_size: usize,
    /// Interval between state snapshots written to disk
    pub autosave_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 1000,
            max_queue_size: 0,
            autosave_secs: 30,
        }
    }
}

/// Channel kind as known to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Voice,
    Text,
}

/// One joinable (or announce-only) channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub guild_id: String,
    pub kind: ChannelKind,
    /// UDP address frames are delivered to (voice channels only)
    #[serde(default)]
    pub sink_addr: Option<String>,
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the config file, falling back to defaults when it does not exist
///
/// A malformed file is still an error.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    debug!(path = %path.display(), "Loading config file");
    load_toml_config(&path)
}

/// Default configuration file path for the platform
///
/// `VOXQ_CONFIG` wins, then `<config_dir>/voxq/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(p));
    }
    dirs::config_dir().map(|d| d.join("voxq").join("config.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("voxq"))
        .unwrap_or_else(|| PathBuf::from("./voxq_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_tools() {
        let config = TomlConfig::default();
        assert_eq!(config.tools.fetch, "yt-dlp");
        assert_eq!(config.tools.transcode, "ffmpeg");
        assert_eq!(config.tools.encode, "dca");
        assert_eq!(config.tools.format_selector, "bestaudio");
        assert!(config.tools.raw_framing);
        assert_eq!(config.playback.idle_poll_ms, 1000);
        assert_eq!(config.playback.max_queue_size, 0);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000
            [tools]
            encode = "/opt/dca"
            [playback]
            max_queue_size = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.port, Some(6000));
        assert_eq!(config.tools.encode, "/opt/dca");
        assert_eq!(config.tools.fetch, "yt-dlp");
        assert_eq!(config.playback.max_queue_size, 25);
        assert_eq!(config.playback.idle_poll_ms, 1000);
    }

    #[test]
    fn test_parse_channels_table() {
        let config: TomlConfig = toml::from_str(
            r#"
            [[channels]]
            id = "100"
            guild_id = "1"
            kind = "voice"
            sink_addr = "127.0.0.1:9000"

            [[channels]]
            id = "200"
            guild_id = "1"
            kind = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].kind, ChannelKind::Voice);
        assert_eq!(config.channels[0].sink_addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(config.channels[1].kind, ChannelKind::Text);
        assert_eq!(config.channels[1].sink_addr, None);
    }
}
