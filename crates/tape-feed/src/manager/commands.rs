//! Feed manager commands, errors, and events.
//!
//! This module defines the message types for communicating with the
//! `FeedManager` actor:
//! - `FeedCommand`: commands sent to the actor (public API calls and
//!   internal transport/timer events share one channel, which is what
//!   serializes every state transition)
//! - `FeedError`: errors surfaced through the public handle
//! - `FeedEvent`: events broadcast to status observers
//!
//! All types are designed for async message passing and follow the
//! panic-free policy.

use std::collections::HashMap;
use std::sync::Arc;
use tape_core::{ChannelId, ChannelState, ChannelStats, UnknownChannelError};
use tape_protocol::ChannelMessage;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Subscriber Callback
// ============================================================================

/// A subscriber callback, invoked once per decoded message.
///
/// Shared so the dispatcher can snapshot the subscriber list cheaply
/// before fan-out. Callbacks run on the manager task: keep them short and
/// hand heavy work to a channel or task of your own.
pub type MessageCallback = Arc<dyn Fn(&ChannelMessage) + Send + Sync>;

/// Identifier of one subscription slot.
///
/// Assigned per `subscribe` call; subscribing the same callback twice
/// yields two distinct ids, each requiring its own disposal.
pub type SubscriptionId = u64;

// ============================================================================
// Feed Commands
// ============================================================================

/// Commands processed by the feed manager actor.
///
/// Request-style commands carry a oneshot channel for the response;
/// fire-and-forget commands (disposal, transport events) do not.
pub enum FeedCommand {
    /// Register a callback for a channel.
    ///
    /// # Errors
    /// - `FeedError::UnknownChannel` if the catalog has no endpoint
    Subscribe {
        /// Channel to subscribe to
        channel: ChannelId,
        /// Callback invoked for every decoded message
        callback: MessageCallback,
        /// Channel to send the assigned subscription id
        respond_to: oneshot::Sender<Result<SubscriptionId, FeedError>>,
    },

    /// Remove one subscription slot.
    ///
    /// Fire-and-forget: sent by `Subscription::dispose` and `Drop`.
    /// Unknown ids are ignored (the slot may already be gone).
    Unsubscribe {
        channel: ChannelId,
        subscription_id: SubscriptionId,
    },

    /// Tear down and re-establish one channel's connection.
    Reconnect { channel: ChannelId },

    /// Apply `Reconnect` to every channel that has subscribers.
    ReconnectAll,

    /// Flip the enablement gate.
    SetEnabled { enabled: bool },

    /// Snapshot per-channel statistics.
    GetStats {
        respond_to: oneshot::Sender<HashMap<ChannelId, ChannelStats>>,
    },

    /// Internal: open a connection if the channel still needs one.
    ///
    /// Sent by delayed-reconnect and retry timers. Re-checks the gate,
    /// the subscriber list, and the current state before acting, so a
    /// stale timer firing is always harmless.
    EnsureConnected { channel: ChannelId },

    /// Internal: an observation from a connection task.
    ///
    /// Ignored unless `generation` matches the channel's current
    /// connection generation.
    Transport {
        channel: ChannelId,
        generation: u64,
        event: ConnEvent,
    },

    /// Disconnect everything and stop the actor.
    Shutdown,
}

impl FeedCommand {
    /// Creates a transport event command.
    pub fn transport(channel: ChannelId, generation: u64, event: ConnEvent) -> Self {
        Self::Transport {
            channel,
            generation,
            event,
        }
    }
}

/// One observation from a connection task.
#[derive(Debug)]
pub enum ConnEvent {
    /// The transport handshake completed.
    Opened,

    /// An inbound payload frame arrived.
    Frame(Vec<u8>),

    /// The transport closed (cleanly or not) without an error report.
    Closed,

    /// The transport failed, before or after the handshake.
    Failed(String),
}

// ============================================================================
// Feed Errors
// ============================================================================

/// Errors surfaced through the public feed handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// The channel is not in the catalog (unknown name, or disabled for
    /// this deployment). A programming or configuration error at the
    /// call site, reported synchronously from `subscribe`.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The manager actor has shut down.
    #[error("feed manager is shut down")]
    ManagerClosed,
}

impl From<UnknownChannelError> for FeedError {
    fn from(err: UnknownChannelError) -> Self {
        Self::UnknownChannel(err.name)
    }
}

// ============================================================================
// Feed Events
// ============================================================================

/// Events broadcast by the manager for status observers (UI indicators).
///
/// Transport failures never reach subscribers through their message
/// callbacks; they surface here and in `ChannelStats`.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A channel's connection state changed.
    StateChanged {
        /// The channel whose state changed
        channel: ChannelId,
        /// The new state
        state: ChannelState,
        /// Error text when the new state is `Error`
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_display() {
        let err = FeedError::UnknownChannel("vol".to_string());
        assert_eq!(err.to_string(), "unknown channel: vol");

        let err = FeedError::ManagerClosed;
        assert_eq!(err.to_string(), "feed manager is shut down");
    }

    #[test]
    fn test_feed_error_from_parse_error() {
        let parse_err = "sentiment".parse::<ChannelId>().unwrap_err();
        let err: FeedError = parse_err.into();
        assert_eq!(err, FeedError::UnknownChannel("sentiment".to_string()));
    }

    #[test]
    fn test_transport_constructor() {
        let cmd = FeedCommand::transport(ChannelId::Flow, 3, ConnEvent::Opened);
        match cmd {
            FeedCommand::Transport {
                channel,
                generation,
                event,
            } => {
                assert_eq!(channel, ChannelId::Flow);
                assert_eq!(generation, 3);
                assert!(matches!(event, ConnEvent::Opened));
            }
            _ => panic!("expected transport command"),
        }
    }

    #[test]
    fn test_feed_event_clone() {
        let event = FeedEvent::StateChanged {
            channel: ChannelId::Gamma,
            state: ChannelState::Error,
            error: Some("connection reset".to_string()),
        };
        let cloned = event.clone();
        let FeedEvent::StateChanged { channel, state, error } = cloned;
        assert_eq!(channel, ChannelId::Gamma);
        assert_eq!(state, ChannelState::Error);
        assert_eq!(error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_command_oneshot_pattern() {
        let (tx, rx) = oneshot::channel::<Result<SubscriptionId, FeedError>>();

        tokio::spawn(async move {
            tx.send(Ok(1)).ok();
        });

        let result = rx.await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Ok(1));
    }
}
