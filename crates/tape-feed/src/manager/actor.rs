//! Feed manager actor - owns all channel state and processes commands.
//!
//! The FeedManager is the single owner of live-data state in the system.
//! It receives commands via an mpsc channel and publishes state changes
//! via broadcast and watch channels.
//!
//! Every mutation of the channel→connection and channel→subscriber maps
//! happens inside this one task, processed strictly in arrival order.
//! That is what makes `ensure_connected` race-free when several
//! subscribers rush to be "first", and what guarantees per-channel
//! delivery order.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic
//! - Subscriber panics are caught at the dispatch boundary

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tape_core::{aggregate_status, ChannelId, ChannelState, ChannelStats};
use tape_protocol::{decode_frame, ChannelMessage, DecodeError};

use crate::catalog::ChannelCatalog;
use crate::config::FeedConfig;
use crate::transport::{run_connection, Connector};

use super::commands::{
    ConnEvent, FeedCommand, FeedError, FeedEvent, MessageCallback, SubscriptionId,
};

// ============================================================================
// Channel Entry
// ============================================================================

/// Per-channel state owned by the actor.
///
/// There is exactly one entry per cataloged channel for the lifetime of
/// the manager; the connection itself comes and goes inside it.
#[derive(Default)]
struct ChannelEntry {
    /// Connection lifecycle state.
    state: ChannelState,

    /// Most recent transport error, cleared on successful connect.
    last_error: Option<String>,

    /// Well-formed messages delivered on this channel.
    message_count: u64,

    /// Frames dropped because they failed to decode.
    decode_error_count: u64,

    /// Registered callbacks in subscription order.
    subscribers: Vec<(SubscriptionId, MessageCallback)>,

    /// Current connection generation. Bumped on every connect and
    /// disconnect; transport events carrying an older generation are
    /// dropped, which makes frames from a superseded socket inert.
    generation: u64,

    /// Cancellation token of the live connection task, if any.
    cancel: Option<CancellationToken>,

    /// Consecutive automatic retry attempts since the last successful
    /// connect.
    retry_attempts: u32,
}

// ============================================================================
// Feed Manager Actor
// ============================================================================

/// The feed manager actor - owns all channel state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes state changes to observers.
///
/// # Ownership
///
/// The actor owns:
/// - `channels`: per-channel entry (state, counters, subscribers)
/// - the enablement gate boolean
///
/// Connection tasks communicate with the actor only through the command
/// channel; nothing else ever sees the maps.
pub struct FeedManager {
    /// Command receiver
    receiver: mpsc::Receiver<FeedCommand>,

    /// Sender side of the command channel, handed to connection tasks
    /// and delayed-reconnect timers.
    self_tx: mpsc::Sender<FeedCommand>,

    /// Transport connector (production: WebSocket; tests: scripted).
    connector: Arc<dyn Connector>,

    /// Channel → endpoint mapping, fixed at creation.
    catalog: ChannelCatalog,

    /// Manager configuration.
    config: FeedConfig,

    /// Per-channel state, one entry per cataloged channel.
    channels: HashMap<ChannelId, ChannelEntry>,

    /// The enablement gate. While false, `ensure_connected` refuses to
    /// open sockets no matter who asks.
    enabled: bool,

    /// Next subscription id to assign.
    next_subscription_id: SubscriptionId,

    /// Global status publisher.
    status_tx: watch::Sender<ChannelState>,

    /// Event publisher for state-change notifications.
    event_tx: broadcast::Sender<FeedEvent>,
}

impl FeedManager {
    /// Creates a new feed manager actor.
    ///
    /// The catalog is derived from `config`; one pristine entry is created
    /// per cataloged channel so `stats` reports every known channel from
    /// the first call.
    pub fn new(
        config: FeedConfig,
        connector: Arc<dyn Connector>,
        receiver: mpsc::Receiver<FeedCommand>,
        self_tx: mpsc::Sender<FeedCommand>,
        status_tx: watch::Sender<ChannelState>,
        event_tx: broadcast::Sender<FeedEvent>,
    ) -> Self {
        let catalog = ChannelCatalog::from_config(&config);
        let channels = catalog
            .channels()
            .map(|channel| (channel, ChannelEntry::default()))
            .collect();
        let enabled = config.start_enabled;

        Self {
            receiver,
            self_tx,
            connector,
            catalog,
            config,
            channels,
            enabled,
            next_subscription_id: 1,
            status_tx,
            event_tx,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until `Shutdown` arrives or every sender is
    /// dropped, then tears down all connections. This is the main entry
    /// point - call this in a spawned task.
    pub async fn run(mut self) {
        info!(
            channels = self.channels.len(),
            enabled = self.enabled,
            "Feed manager starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            let stop = matches!(cmd, FeedCommand::Shutdown);
            self.handle_command(cmd);
            if stop {
                break;
            }
        }

        self.disconnect_all("manager stopping");
        info!("Feed manager stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: FeedCommand) {
        match cmd {
            FeedCommand::Subscribe {
                channel,
                callback,
                respond_to,
            } => {
                let result = self.handle_subscribe(channel, callback);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(result);
            }
            FeedCommand::Unsubscribe {
                channel,
                subscription_id,
            } => {
                self.handle_unsubscribe(channel, subscription_id);
            }
            FeedCommand::Reconnect { channel } => {
                self.reconnect(channel);
            }
            FeedCommand::ReconnectAll => {
                self.reconnect_all();
            }
            FeedCommand::SetEnabled { enabled } => {
                self.handle_set_enabled(enabled);
            }
            FeedCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats_snapshot());
            }
            FeedCommand::EnsureConnected { channel } => {
                self.ensure_connected(channel);
            }
            FeedCommand::Transport {
                channel,
                generation,
                event,
            } => {
                self.handle_transport(channel, generation, event);
            }
            FeedCommand::Shutdown => {
                debug!("shutdown requested");
                // Teardown happens in run() after the loop exits.
            }
        }
    }

    // ========================================================================
    // Subscriber Registry
    // ========================================================================

    /// Handles a subscribe request.
    ///
    /// The first subscriber on a channel triggers `ensure_connected`.
    fn handle_subscribe(
        &mut self,
        channel: ChannelId,
        callback: MessageCallback,
    ) -> Result<SubscriptionId, FeedError> {
        let id = self.next_subscription_id;

        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => {
                warn!(%channel, "subscribe rejected: channel not in catalog");
                return Err(FeedError::UnknownChannel(channel.as_str().to_string()));
            }
        };

        self.next_subscription_id += 1;
        entry.subscribers.push((id, callback));
        let first = entry.subscribers.len() == 1;
        let count = entry.subscribers.len();

        debug!(
            %channel,
            subscription_id = id,
            subscriber_count = count,
            "subscriber added"
        );

        if first {
            self.ensure_connected(channel);
        }

        Ok(id)
    }

    /// Handles removal of one subscription slot.
    ///
    /// The last subscriber leaving triggers `disconnect`.
    fn handle_unsubscribe(&mut self, channel: ChannelId, subscription_id: SubscriptionId) {
        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => return,
        };

        let before = entry.subscribers.len();
        entry.subscribers.retain(|(id, _)| *id != subscription_id);

        if entry.subscribers.len() == before {
            // Slot already gone; disposal raced a shutdown or was for a
            // superseded manager. Nothing to do.
            debug!(%channel, subscription_id, "unsubscribe for unknown slot ignored");
            return;
        }

        let empty = entry.subscribers.is_empty();
        let remaining = entry.subscribers.len();
        debug!(%channel, subscription_id, remaining, "subscriber removed");

        if empty {
            self.disconnect(channel, "last subscriber removed");
        }
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// Opens a connection for `channel` if one is needed and allowed.
    ///
    /// Idempotent: a channel that is already `Connecting` or `Connected`
    /// is left alone (several subscribers can race to be "first", and
    /// delayed reconnect timers can fire after the world has moved on).
    /// Refuses while the gate is off or the channel has no subscribers.
    fn ensure_connected(&mut self, channel: ChannelId) {
        if !self.enabled {
            debug!(%channel, "gate is off, refusing to connect");
            return;
        }

        let endpoint = match self.catalog.endpoint_for(channel) {
            Some(url) => url.to_string(),
            None => {
                warn!(%channel, "no endpoint in catalog, cannot connect");
                return;
            }
        };

        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => return,
        };

        if entry.subscribers.is_empty() {
            debug!(%channel, "no subscribers, leaving channel disconnected");
            return;
        }

        if entry.state.is_active() {
            debug!(%channel, state = %entry.state, "already connecting or connected");
            return;
        }

        entry.generation += 1;
        let generation = entry.generation;
        let cancel = CancellationToken::new();
        entry.cancel = Some(cancel.clone());
        entry.state = ChannelState::Connecting;

        info!(%channel, generation, endpoint = %endpoint, "opening connection");

        tokio::spawn(run_connection(
            Arc::clone(&self.connector),
            channel,
            endpoint,
            generation,
            self.config.connect_timeout(),
            self.self_tx.clone(),
            cancel,
        ));

        self.publish_state(channel, ChannelState::Connecting, None);
    }

    /// Closes `channel`'s connection, if any.
    ///
    /// Bumps the generation so frames still in flight from the old socket
    /// are dropped, and cancels the connection task. Subscriber lists are
    /// never touched here.
    fn disconnect(&mut self, channel: ChannelId, reason: &str) {
        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => return,
        };

        if let Some(cancel) = entry.cancel.take() {
            cancel.cancel();
        }
        entry.generation += 1;
        entry.retry_attempts = 0;

        if entry.state == ChannelState::Disconnected {
            return;
        }
        entry.state = ChannelState::Disconnected;

        info!(%channel, reason, "channel disconnected");
        self.publish_state(channel, ChannelState::Disconnected, None);
    }

    /// Disconnects every channel.
    fn disconnect_all(&mut self, reason: &str) {
        let channels: Vec<ChannelId> = self.channels.keys().copied().collect();
        for channel in channels {
            self.disconnect(channel, reason);
        }
    }

    /// Tears down and re-establishes one channel's connection.
    ///
    /// The follow-up connect runs after the configured delay so the prior
    /// socket can release its resources instead of racing a fresh one
    /// against the same endpoint.
    fn reconnect(&mut self, channel: ChannelId) {
        if !self.channels.contains_key(&channel) {
            warn!(%channel, "reconnect for unknown channel ignored");
            return;
        }

        self.disconnect(channel, "reconnect requested");

        let delay = self.config.reconnect_delay();
        debug!(
            %channel,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.spawn_delayed_ensure(channel, delay);
    }

    /// Applies `reconnect` to every channel with at least one subscriber.
    fn reconnect_all(&mut self) {
        let channels: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|(_, entry)| !entry.subscribers.is_empty())
            .map(|(channel, _)| *channel)
            .collect();

        if channels.is_empty() {
            debug!("reconnect_all: no channels with subscribers");
            return;
        }

        info!(count = channels.len(), "reconnecting all subscribed channels");
        for channel in channels {
            self.reconnect(channel);
        }
    }

    /// Flips the enablement gate.
    ///
    /// Off: every channel is disconnected but subscriber lists survive
    /// (a pause, not an unsubscribe). On: channels with subscribers are
    /// reconnected.
    fn handle_set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            debug!(enabled, "enablement gate unchanged");
            return;
        }
        self.enabled = enabled;

        let channels: Vec<ChannelId> = self.channels.keys().copied().collect();
        if enabled {
            info!("feed enabled, restoring channels with subscribers");
            for channel in channels {
                // ensure_connected skips channels without subscribers
                self.ensure_connected(channel);
            }
        } else {
            info!("feed disabled, pausing all channels");
            for channel in channels {
                self.disconnect(channel, "feed disabled");
            }
        }
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    /// Applies an observation from a connection task.
    ///
    /// Events from superseded generations are dropped: the socket they
    /// came from no longer represents the channel.
    fn handle_transport(&mut self, channel: ChannelId, generation: u64, event: ConnEvent) {
        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => return,
        };

        if generation != entry.generation {
            debug!(
                %channel,
                generation,
                current = entry.generation,
                "dropping event from superseded connection"
            );
            return;
        }

        match event {
            ConnEvent::Opened => {
                entry.state = ChannelState::Connected;
                entry.last_error = None;
                entry.retry_attempts = 0;
                info!(%channel, generation, "channel connected");
                self.publish_state(channel, ChannelState::Connected, None);
            }
            ConnEvent::Frame(payload) => {
                self.dispatch_frame(channel, &payload);
            }
            ConnEvent::Closed => {
                entry.state = ChannelState::Disconnected;
                entry.cancel = None;
                warn!(%channel, generation, "transport closed by remote");
                self.publish_state(channel, ChannelState::Disconnected, None);
                self.maybe_schedule_retry(channel);
            }
            ConnEvent::Failed(message) => {
                entry.state = ChannelState::Error;
                entry.last_error = Some(message.clone());
                entry.cancel = None;
                error!(%channel, generation, error = %message, "transport failed");
                self.publish_state(channel, ChannelState::Error, Some(message));
                self.maybe_schedule_retry(channel);
            }
        }
    }

    // ========================================================================
    // Message Fan-Out
    // ========================================================================

    /// Decodes one inbound frame and fans it out to all subscribers.
    ///
    /// A frame that fails to decode is logged and dropped; it never
    /// reaches subscribers and never disturbs the connection. Fan-out
    /// iterates a snapshot of the subscriber list, so a callback that
    /// subscribes or disposes mid-dispatch only affects later frames.
    fn dispatch_frame(&mut self, channel: ChannelId, payload: &[u8]) {
        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => return,
        };

        let message = match decode_frame(channel, payload) {
            Ok(message) => message,
            Err(DecodeError::EmptyFrame { .. }) => {
                // Upstream keepalive; nothing to deliver.
                debug!(%channel, "dropping empty frame");
                return;
            }
            Err(e) => {
                entry.decode_error_count += 1;
                warn!(%channel, error = %e, "dropping malformed frame");
                return;
            }
        };

        entry.message_count += 1;
        let snapshot = entry.subscribers.clone();

        for (subscription_id, callback) in &snapshot {
            let callback: &(dyn Fn(&ChannelMessage) + Send + Sync) = callback.as_ref();
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&message)));
            if outcome.is_err() {
                error!(
                    %channel,
                    subscription_id,
                    "subscriber callback panicked; continuing fan-out"
                );
            }
        }
    }

    // ========================================================================
    // Retry Policy
    // ========================================================================

    /// Schedules an automatic reconnect after a transport failure or
    /// closure, when the retry policy allows it.
    ///
    /// Only channels that still have subscribers are retried; the delayed
    /// `EnsureConnected` re-checks everything again when it fires.
    fn maybe_schedule_retry(&mut self, channel: ChannelId) {
        if !self.config.retry.auto_retry || !self.enabled {
            return;
        }

        let entry = match self.channels.get_mut(&channel) {
            Some(entry) => entry,
            None => return,
        };
        if entry.subscribers.is_empty() {
            return;
        }

        let attempt = entry.retry_attempts;
        if self.config.retry.is_exhausted(attempt) {
            warn!(
                %channel,
                attempts = attempt,
                "retry budget exhausted, waiting for manual reconnect"
            );
            return;
        }
        entry.retry_attempts += 1;

        let delay = self.config.retry.delay_for(attempt);
        info!(
            %channel,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "scheduling automatic reconnect"
        );
        self.spawn_delayed_ensure(channel, delay);
    }

    /// Spawns a timer that asks the actor to connect `channel` later.
    fn spawn_delayed_ensure(&self, channel: ChannelId, delay: Duration) {
        let sender = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Ignore send errors - the manager may have shut down
            let _ = sender.send(FeedCommand::EnsureConnected { channel }).await;
        });
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Builds the per-channel statistics snapshot.
    fn stats_snapshot(&self) -> HashMap<ChannelId, ChannelStats> {
        self.channels
            .iter()
            .map(|(channel, entry)| {
                (
                    *channel,
                    ChannelStats {
                        state: entry.state,
                        message_count: entry.message_count,
                        decode_error_count: entry.decode_error_count,
                        subscriber_count: entry.subscribers.len(),
                        last_error: entry.last_error.clone(),
                    },
                )
            })
            .collect()
    }

    /// Broadcasts a state change and refreshes the global status.
    fn publish_state(&self, channel: ChannelId, state: ChannelState, error: Option<String>) {
        // Ignore send error - no observers is fine
        let _ = self.event_tx.send(FeedEvent::StateChanged {
            channel,
            state,
            error,
        });

        let status = aggregate_status(self.channels.values().map(|entry| entry.state));
        self.status_tx.send_if_modified(|current| {
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        });
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the state of a channel.
    #[cfg(test)]
    fn state_of(&self, channel: ChannelId) -> Option<ChannelState> {
        self.channels.get(&channel).map(|entry| entry.state)
    }

    /// Returns the current connection generation of a channel.
    #[cfg(test)]
    fn generation_of(&self, channel: ChannelId) -> u64 {
        self.channels
            .get(&channel)
            .map(|entry| entry.generation)
            .unwrap_or(0)
    }
}

// ============================================================================
// Tests
// ============================================================================
