//! Tape Feed - Multi-channel live-data subscriptions for the Tape dashboard
//!
//! This crate turns an arbitrary number of consumers, each interested in
//! one or more named live-data channels, into a minimal set of persistent
//! WebSocket connections: one per channel with at least one subscriber,
//! zero for everything else.
//!
//! - `config` - manager configuration and retry policy (TOML-loadable)
//! - `catalog` - channel → endpoint mapping
//! - `transport` - connector seam and the per-connection task
//! - `manager` - the actor owning all state, plus handle and subscription
//!   guard
//!
//! # Core invariant
//!
//! A transport connection exists for a channel if and only if that
//! channel's subscriber list is non-empty and the enablement gate is on.
//! Subscribing first opens the connection, disposing the last
//! subscription closes it, and `set_enabled(false)` pauses everything
//! without forgetting who subscribed.
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Subscriber callback panics are caught at the dispatch boundary

pub mod catalog;
pub mod config;
pub mod manager;
pub mod transport;

// Re-exports for convenience
pub use catalog::ChannelCatalog;
pub use config::{ConfigError, FeedConfig, RetryPolicy};
pub use manager::{
    spawn_feed, spawn_feed_with_connector, FeedError, FeedEvent, FeedHandle, FeedManager,
    Subscription,
};
pub use transport::{Connector, FrameSource, TransportError, WsConnector};
