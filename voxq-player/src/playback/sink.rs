//! Transport sinks
//!
//! A sink accepts encoded frames for real-time delivery and carries the
//! speaking indicator. `send` may wait; that wait is the backpressure the
//! scheduler relies on.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Real-time frame transport
#[async_trait]
pub trait TransportSink: Send + Sync {
    /// Deliver one frame, waiting as long as the transport needs
    async fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Toggle the speaking indicator
    async fn set_speaking(&self, speaking: bool);

    /// Whether frames can be delivered right now
    fn is_ready(&self) -> bool;
}

/// Observable sink activity (ChannelSink)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Speaking(bool),
    Frame(Vec<u8>),
}

/// Sink that forwards everything into a bounded channel
///
/// Used to embed the player in another host process and in tests.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    /// Create the sink and the receiving end; `capacity` bounds in-flight frames
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TransportSink for ChannelSink {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.tx
            .send(SinkEvent::Frame(frame))
            .await
            .map_err(|_| Error::Transport("sink receiver dropped".to_string()))
    }

    async fn set_speaking(&self, speaking: bool) {
        if self.tx.send(SinkEvent::Speaking(speaking)).await.is_err() {
            debug!(speaking, "Speaking update dropped, receiver gone");
        }
    }

    fn is_ready(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Sink sending each frame as one UDP datagram to a fixed peer
pub struct UdpSink {
    socket: UdpSocket,
    speaking: AtomicBool,
}

impl UdpSink {
    /// Bind an ephemeral local port and connect it to `addr`
    pub async fn connect(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        info!(peer = %addr, "UDP transport connected");
        Ok(Self {
            socket,
            speaking: AtomicBool::new(false),
        })
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransportSink for UdpSink {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.socket
            .send(&frame)
            .await
            .map(|_| ())
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn set_speaking(&self, speaking: bool) {
        let previous = self.speaking.swap(speaking, Ordering::Relaxed);
        if previous != speaking {
            debug!(speaking, "Speaking indicator changed");
        }
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// The sink currently attached to the player, if any
///
/// Readiness seen by the scheduler is "a sink is attached and ready".
#[derive(Clone, Default)]
pub struct SinkSlot {
    inner: Arc<RwLock<Option<Arc<dyn TransportSink>>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, sink: Arc<dyn TransportSink>) {
        *self.inner.write().await = Some(sink);
    }

    pub async fn detach(&self) -> bool {
        self.inner.write().await.take().is_some()
    }

    /// The attached sink if it is ready for frames
    pub async fn ready(&self) -> Option<Arc<dyn TransportSink>> {
        self.inner
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_ready())
            .cloned()
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
