//! Control handle and scheduler slot
//!
//! A live [`ControlHandle`] means a scheduler is running. The slot is the
//! only place handles are created, and creation happens under its lock, so
//! two concurrent `start` calls can never both spawn a scheduler.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pending control messages before senders wait
pub const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Live playback command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMessage {
    Skip,
    Pause,
    Resume,
}

impl std::fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMessage::Skip => write!(f, "skip"),
            ControlMessage::Pause => write!(f, "pause"),
            ControlMessage::Resume => write!(f, "resume"),
        }
    }
}

/// Cancellation signal + control channel of one running scheduler
struct ControlHandle {
    cancel: CancellationToken,
    control_tx: mpsc::Sender<ControlMessage>,
    task: JoinHandle<()>,
}

impl ControlHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Holder of the (at most one) control handle
#[derive(Clone, Default)]
pub struct SchedulerSlot {
    handle: Arc<Mutex<Option<ControlHandle>>>,
}

impl SchedulerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a scheduler unless one is already live
    ///
    /// `spawn` receives the cancellation token and control receiver for the
    /// new scheduler. A handle whose task already exited is replaced.
    pub async fn start<F, Fut>(&self, spawn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken, mpsc::Receiver<ControlMessage>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock().await;
        if slot.as_ref().is_some_and(ControlHandle::is_live) {
            return Err(Error::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let task = tokio::spawn(spawn(cancel.clone(), control_rx));

        *slot = Some(ControlHandle {
            cancel,
            control_tx,
            task,
        });
        info!("Scheduler handle created");
        Ok(())
    }

    /// Fire cancellation, close the control channel and wait for the task
    pub async fn stop(&self) -> Result<()> {
        let handle = self.handle.lock().await.take().ok_or(Error::NotRunning)?;

        handle.cancel.cancel();
        drop(handle.control_tx);

        if let Err(e) = handle.task.await {
            if e.is_panic() {
                warn!("Scheduler task panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Deliver a control message to the running scheduler
    ///
    /// The slot lock is released before waiting on the channel.
    pub async fn send(&self, message: ControlMessage) -> Result<()> {
        let tx = {
            let slot = self.handle.lock().await;
            slot.as_ref()
                .filter(|h| h.is_live())
                .map(|h| h.control_tx.clone())
                .ok_or(Error::NotRunning)?
        };

        debug!(%message, "Sending control message");
        tx.send(message).await.map_err(|_| Error::NotRunning)
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(ControlHandle::is_live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scheduler stand-in that records messages until cancelled
    async fn echo_until_cancelled(
        cancel: CancellationToken,
        mut rx: mpsc::Receiver<ControlMessage>,
        seen: Arc<Mutex<Vec<ControlMessage>>>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                msg = rx.recv() => match msg {
                    Some(m) => seen.lock().await.push(m),
                    None => return,
                },
            }
        }
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let slot = SchedulerSlot::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        slot.start(move |c, rx| echo_until_cancelled(c, rx, s))
            .await
            .unwrap();
        let s = seen.clone();
        assert!(matches!(
            slot.start(move |c, rx| echo_until_cancelled(c, rx, s)).await,
            Err(Error::AlreadyRunning)
        ));
        assert!(slot.is_running().await);

        slot.stop().await.unwrap();
        assert!(!slot.is_running().await);
    }

    #[tokio::test]
    async fn test_concurrent_starts_spawn_once() {
        let slot = SchedulerSlot::new();
        let spawned = Arc::new(AtomicUsize::new(0));

        let mut attempts = Vec::new();
        for _ in 0..16 {
            let slot = slot.clone();
            let spawned = spawned.clone();
            attempts.push(tokio::spawn(async move {
                slot.start(move |cancel, _rx| async move {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    cancel.cancelled().await;
                })
                .await
                .is_ok()
            }));
        }

        let mut ok = 0;
        for a in attempts {
            if a.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);

        slot.stop().await.unwrap();
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let slot = SchedulerSlot::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        slot.start(move |c, rx| echo_until_cancelled(c, rx, s))
            .await
            .unwrap();

        for m in [ControlMessage::Pause, ControlMessage::Skip, ControlMessage::Resume] {
            slot.send(m).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        slot.stop().await.unwrap();

        assert_eq!(
            *seen.lock().await,
            vec![ControlMessage::Pause, ControlMessage::Skip, ControlMessage::Resume]
        );
    }

    #[tokio::test]
    async fn test_controls_without_scheduler_are_not_running() {
        let slot = SchedulerSlot::new();
        assert!(matches!(
            slot.send(ControlMessage::Skip).await,
            Err(Error::NotRunning)
        ));
        assert!(matches!(slot.stop().await, Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_finished_handle_is_replaced() {
        let slot = SchedulerSlot::new();
        slot.start(|_, _| async {}).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!slot.is_running().await);
        slot.start(|cancel, _| async move { cancel.cancelled().await })
            .await
            .unwrap();
        assert!(slot.is_running().await);
        slot.stop().await.unwrap();
    }
}
