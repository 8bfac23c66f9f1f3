//! Subscription guard returned by `subscribe`.

use super::commands::{FeedCommand, SubscriptionId};
use tape_core::ChannelId;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle to one registered callback.
///
/// Dropping the guard (or calling [`dispose`](Subscription::dispose))
/// removes exactly this callback slot from the channel's subscriber list;
/// when the last slot goes, the manager closes the channel's connection.
///
/// Disposal is idempotent: the first call wins, later calls and the
/// eventual `Drop` are no-ops. Disposal only affects future dispatches;
/// a fan-out already in flight still delivers to this subscriber.
pub struct Subscription {
    channel: ChannelId,
    id: SubscriptionId,
    /// `None` once disposed.
    sender: Option<mpsc::Sender<FeedCommand>>,
}

impl Subscription {
    pub(crate) fn new(
        channel: ChannelId,
        id: SubscriptionId,
        sender: mpsc::Sender<FeedCommand>,
    ) -> Self {
        Self {
            channel,
            id,
            sender: Some(sender),
        }
    }

    /// The channel this subscription is registered on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Removes this callback from the channel's subscriber list.
    ///
    /// Best-effort fire-and-forget: if the manager has already shut down
    /// there is nothing left to unsubscribe from.
    pub fn dispose(&mut self) {
        if let Some(sender) = self.sender.take() {
            let result = sender.try_send(FeedCommand::Unsubscribe {
                channel: self.channel,
                subscription_id: self.id,
            });
            if result.is_err() {
                debug!(
                    channel = %self.channel,
                    subscription_id = self.id,
                    "unsubscribe not delivered (manager gone or busy)"
                );
            }
        }
    }

    /// True once `dispose` has run (explicitly or via `Drop`).
    pub fn is_disposed(&self) -> bool {
        self.sender.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
