//! Client interface for interacting with the FeedManager actor.
//!
//! The `FeedHandle` provides a cheap-to-clone interface for subscribing
//! to channels, driving the connection lifecycle, and observing status.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `FeedError::ManagerClosed`

use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use tape_core::{ChannelId, ChannelState, ChannelStats};
use tape_protocol::ChannelMessage;

use super::commands::{FeedCommand, FeedError, FeedEvent};
use super::subscription::Subscription;
use std::sync::Arc;

// ============================================================================
// Feed Handle
// ============================================================================

/// Handle for interacting with the feed manager actor.
///
/// Cheap to clone and share across tasks. All operations enqueue a command
/// and return; lifecycle effects (connects, disconnects) happen
/// asynchronously on the manager task as transport events arrive.
///
/// # Usage
///
/// ```ignore
/// let handle = spawn_feed(FeedConfig::default());
///
/// let sub = handle
///     .subscribe(ChannelId::Flow, |msg| println!("{msg:?}"))
///     .await?;
///
/// // ... later: dropping `sub` releases the channel
/// drop(sub);
/// ```
#[derive(Clone)]
pub struct FeedHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<FeedCommand>,

    /// Global status, recomputed by the actor on every state change
    status_rx: watch::Receiver<ChannelState>,

    /// Event broadcaster for subscribing to state changes
    event_sender: broadcast::Sender<FeedEvent>,
}

impl FeedHandle {
    /// Create a new feed handle.
    pub(crate) fn new(
        sender: mpsc::Sender<FeedCommand>,
        status_rx: watch::Receiver<ChannelState>,
        event_sender: broadcast::Sender<FeedEvent>,
    ) -> Self {
        Self {
            sender,
            status_rx,
            event_sender,
        }
    }

    /// Register `callback` for every decoded message on `channel`.
    ///
    /// If this is the channel's first subscriber (and the gate is on), the
    /// manager opens a connection. The returned guard removes exactly this
    /// slot on disposal; subscribing the same callback twice yields two
    /// independent guards.
    ///
    /// # Errors
    ///
    /// - `FeedError::UnknownChannel` if the channel is not in the catalog
    /// - `FeedError::ManagerClosed` if the manager has shut down
    pub async fn subscribe<F>(
        &self,
        channel: ChannelId,
        callback: F,
    ) -> Result<Subscription, FeedError>
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(FeedCommand::Subscribe {
                channel,
                callback: Arc::new(callback),
                respond_to: tx,
            })
            .await
            .map_err(|_| FeedError::ManagerClosed)?;

        let id = rx.await.map_err(|_| FeedError::ManagerClosed)??;
        Ok(Subscription::new(channel, id, self.sender.clone()))
    }

    /// Tear down and re-establish one channel's connection.
    ///
    /// The manual recovery path for a channel stuck in `Error` (or
    /// `Connecting` against a dead endpoint). Returns once the command is
    /// enqueued; the reconnect itself happens asynchronously.
    pub async fn reconnect(&self, channel: ChannelId) -> Result<(), FeedError> {
        self.sender
            .send(FeedCommand::Reconnect { channel })
            .await
            .map_err(|_| FeedError::ManagerClosed)
    }

    /// Reconnect every channel that currently has subscribers.
    ///
    /// Channels with no subscribers are left untouched.
    pub async fn reconnect_all(&self) -> Result<(), FeedError> {
        self.sender
            .send(FeedCommand::ReconnectAll)
            .await
            .map_err(|_| FeedError::ManagerClosed)
    }

    /// Flip the enablement gate.
    ///
    /// `false` disconnects every channel while preserving subscriber
    /// lists; `true` restores connections for channels with subscribers.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), FeedError> {
        self.sender
            .send(FeedCommand::SetEnabled { enabled })
            .await
            .map_err(|_| FeedError::ManagerClosed)
    }

    /// Snapshot per-channel statistics.
    ///
    /// The map contains every cataloged channel; lookups for anything
    /// else return `None`. Safe to poll.
    pub async fn stats(&self) -> Result<HashMap<ChannelId, ChannelStats>, FeedError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(FeedCommand::GetStats { respond_to: tx })
            .await
            .map_err(|_| FeedError::ManagerClosed)?;

        rx.await.map_err(|_| FeedError::ManagerClosed)
    }

    /// Current global status (see `tape_core::aggregate_status`).
    pub fn global_status(&self) -> ChannelState {
        *self.status_rx.borrow()
    }

    /// Watch receiver for the global status.
    ///
    /// This is a synchronous operation - it doesn't communicate with the
    /// actor.
    pub fn status_watch(&self) -> watch::Receiver<ChannelState> {
        self.status_rx.clone()
    }

    /// Subscribe to feed events (per-channel state changes).
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_sender.subscribe()
    }

    /// Disconnect every channel and stop the manager actor.
    ///
    /// Outstanding `Subscription` guards become inert.
    pub async fn shutdown(&self) {
        // Fire-and-forget: ignore send errors (actor may already be gone)
        let _ = self.sender.send(FeedCommand::Shutdown).await;
    }

    /// Check if the manager actor is still running.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (FeedHandle, mpsc::Receiver<FeedCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        let (_status_tx, status_rx) = watch::channel(ChannelState::Disconnected);
        let handle = FeedHandle::new(cmd_tx, status_rx, event_tx);
        (handle, cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_subscribe_sends_command_and_returns_guard() {
        let (handle, mut rx) = create_test_handle();

        let responder = tokio::spawn(async move {
            if let Some(FeedCommand::Subscribe {
                channel,
                respond_to,
                ..
            }) = rx.recv().await
            {
                assert_eq!(channel, ChannelId::Flow);
                let _ = respond_to.send(Ok(9));
                return true;
            }
            false
        });

        let sub = handle.subscribe(ChannelId::Flow, |_msg| {}).await.unwrap();
        assert_eq!(sub.channel(), ChannelId::Flow);
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribe_propagates_unknown_channel() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(FeedCommand::Subscribe { respond_to, .. }) = rx.recv().await {
                let _ = respond_to.send(Err(FeedError::UnknownChannel("flow".to_string())));
            }
        });

        let result = handle.subscribe(ChannelId::Flow, |_msg| {}).await;
        assert!(matches!(result, Err(FeedError::UnknownChannel(_))));
    }

    #[tokio::test]
    async fn test_subscribe_manager_closed() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.subscribe(ChannelId::Flow, |_msg| {}).await;
        assert!(matches!(result, Err(FeedError::ManagerClosed)));
    }

    #[tokio::test]
    async fn test_reconnect_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let receiver = tokio::spawn(async move {
            matches!(
                rx.recv().await,
                Some(FeedCommand::Reconnect {
                    channel: ChannelId::Gamma
                })
            )
        });

        handle.reconnect(ChannelId::Gamma).await.unwrap();
        assert!(receiver.await.unwrap());
    }

    #[tokio::test]
    async fn test_set_enabled_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let receiver = tokio::spawn(async move {
            matches!(
                rx.recv().await,
                Some(FeedCommand::SetEnabled { enabled: false })
            )
        });

        handle.set_enabled(false).await.unwrap();
        assert!(receiver.await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_round_trip() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(FeedCommand::GetStats { respond_to }) = rx.recv().await {
                let mut map = HashMap::new();
                map.insert(ChannelId::Flow, ChannelStats::default());
                let _ = respond_to.send(map);
            }
        });

        let stats = handle.stats().await.unwrap();
        assert!(stats.contains_key(&ChannelId::Flow));
        assert!(!stats.contains_key(&ChannelId::Gamma));
    }

    #[tokio::test]
    async fn test_stats_manager_closed() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(matches!(
            handle.stats().await,
            Err(FeedError::ManagerClosed)
        ));
    }

    #[tokio::test]
    async fn test_global_status_reads_watch() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        let (status_tx, status_rx) = watch::channel(ChannelState::Disconnected);
        let handle = FeedHandle::new(cmd_tx, status_rx, event_tx);

        assert_eq!(handle.global_status(), ChannelState::Disconnected);

        status_tx.send(ChannelState::Connected).unwrap();
        assert_eq!(handle.global_status(), ChannelState::Connected);
    }

    #[tokio::test]
    async fn test_shutdown_ignores_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        // Should not panic or error
        handle.shutdown().await;
        assert!(!handle.is_running());
    }
}
