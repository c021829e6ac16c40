//! Voice gateway
//!
//! The host side that turns a channel id into a live transport. The player
//! only needs `join`/`leave` plus a channel lookup for announce targets.

use crate::error::{Error, Result};
use crate::playback::sink::{TransportSink, UdpSink};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use voxq_common::config::{ChannelConfig, ChannelKind};

/// A joined voice channel and its frame transport
#[derive(Clone)]
pub struct VoiceConnection {
    pub guild_id: String,
    pub channel_id: String,
    pub sink: Arc<dyn TransportSink>,
}

impl std::fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConnection")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join a voice channel
    ///
    /// Unknown ids are `InvalidChannel`, non-voice channels are
    /// `NotVoiceChannel`.
    async fn join(&self, channel_id: &str) -> Result<VoiceConnection>;

    /// Leave whatever voice channel is joined
    async fn leave(&self) -> Result<()>;

    /// Kind of a known channel; `InvalidChannel` otherwise
    async fn channel_kind(&self, channel_id: &str) -> Result<ChannelKind>;
}

/// Gateway backed by the `[[channels]]` config table
///
/// Voice channels connect a UDP sink to their `sink_addr`.
#[derive(Debug, Clone, Default)]
pub struct StaticGateway {
    channels: Vec<ChannelConfig>,
}

impl StaticGateway {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self { channels }
    }

    fn lookup(&self, channel_id: &str) -> Result<&ChannelConfig> {
        self.channels
            .iter()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| Error::InvalidChannel(channel_id.to_string()))
    }
}

#[async_trait]
impl VoiceGateway for StaticGateway {
    async fn join(&self, channel_id: &str) -> Result<VoiceConnection> {
        let channel = self.lookup(channel_id)?;
        if channel.kind != ChannelKind::Voice {
            return Err(Error::NotVoiceChannel(channel_id.to_string()));
        }

        let addr = channel
            .sink_addr
            .as_deref()
            .ok_or_else(|| Error::JoinFailed(format!("no sink_addr for channel {}", channel_id)))?;
        let sink = UdpSink::connect(addr)
            .await
            .map_err(|e| Error::JoinFailed(e.to_string()))?;

        info!(guild_id = %channel.guild_id, %channel_id, "Joined voice channel");
        Ok(VoiceConnection {
            guild_id: channel.guild_id.clone(),
            channel_id: channel.id.clone(),
            sink: Arc::new(sink),
        })
    }

    async fn leave(&self) -> Result<()> {
        info!("Left voice channel");
        Ok(())
    }

    async fn channel_kind(&self, channel_id: &str) -> Result<ChannelKind> {
        Ok(self.lookup(channel_id)?.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> StaticGateway {
        StaticGateway::new(vec![
            ChannelConfig {
                id: "voice-1".into(),
                guild_id: "guild".into(),
                kind: ChannelKind::Voice,
                sink_addr: Some("127.0.0.1:9".into()),
            },
            ChannelConfig {
                id: "voice-2".into(),
                guild_id: "guild".into(),
                kind: ChannelKind::Voice,
                sink_addr: None,
            },
            ChannelConfig {
                id: "text-1".into(),
                guild_id: "guild".into(),
                kind: ChannelKind::Text,
                sink_addr: None,
            },
        ])
    }

    #[tokio::test]
    async fn test_join_voice_channel() {
        let conn = gateway().join("voice-1").await.unwrap();
        assert_eq!(conn.guild_id, "guild");
        assert_eq!(conn.channel_id, "voice-1");
        assert!(conn.sink.is_ready());
    }

    #[tokio::test]
    async fn test_join_rejects_bad_targets() {
        let gw = gateway();
        assert!(matches!(gw.join("nope").await, Err(Error::InvalidChannel(_))));
        assert!(matches!(gw.join("text-1").await, Err(Error::NotVoiceChannel(_))));
        assert!(matches!(gw.join("voice-2").await, Err(Error::JoinFailed(_))));
    }

    #[tokio::test]
    async fn test_channel_kind() {
        let gw = gateway();
        assert_eq!(gw.channel_kind("text-1").await.unwrap(), ChannelKind::Text);
        assert!(matches!(
            gw.channel_kind("missing").await,
            Err(Error::InvalidChannel(_))
        ));
    }
}
