//! Feed manager using the actor pattern.
//!
//! The manager is the single owner of all live-data state: the
//! channel→connection map and the channel→subscriber lists. It receives
//! commands via a tokio mpsc channel and publishes status through watch
//! and broadcast channels.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  UI Consumers   │────▶│   FeedManager   │────▶│ watch / broadcast │
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       ▲                        │
//!         │   FeedCommand         │   ConnEvent            │
//!         │   (mpsc channel)      │   (same channel)       ▼
//!         ▼                       │                 Status observers
//!    subscribe/reconnect   Connection tasks
//!    set_enabled/stats     (one per live channel)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tape_core::ChannelState;
use tokio::sync::{broadcast, mpsc, watch};

pub mod commands;
mod actor;
mod handle;
mod subscription;

pub use actor::FeedManager;
pub use commands::{
    ConnEvent, FeedCommand, FeedError, FeedEvent, MessageCallback, SubscriptionId,
};
pub use handle::FeedHandle;
pub use subscription::Subscription;

use crate::config::FeedConfig;
use crate::transport::{Connector, WsConnector};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the feed manager actor and return a handle for interaction.
///
/// Uses the production WebSocket connector. The manager lives until
/// `FeedHandle::shutdown` is called; multiple managers can coexist in
/// one process, each with its own channels, connections, and gate.
///
/// # Example
///
/// ```no_run
/// use tape_feed::{spawn_feed, FeedConfig};
/// use tape_core::ChannelId;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_feed(FeedConfig::default());
///
///     let _sub = handle
///         .subscribe(ChannelId::Flow, |msg| println!("{msg:?}"))
///         .await;
/// }
/// ```
pub fn spawn_feed(config: FeedConfig) -> FeedHandle {
    spawn_feed_with_connector(config, Arc::new(WsConnector))
}

/// Spawn the feed manager with a custom transport connector.
///
/// This is the seam tests and embedders use to run the full manager
/// against scripted or instrumented connections.
pub fn spawn_feed_with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> FeedHandle {
    // Create channels
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
    let (status_tx, status_rx) = watch::channel(ChannelState::Disconnected);

    // Create and spawn actor
    let manager = FeedManager::new(
        config,
        connector,
        cmd_rx,
        cmd_tx.clone(),
        status_tx,
        event_tx.clone(),
    );
    tokio::spawn(manager.run());

    FeedHandle::new(cmd_tx, status_rx, event_tx)
}
