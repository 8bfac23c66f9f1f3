//! Tape Core - Shared types for live market-data channels
//!
//! This crate provides the core domain types shared between
//! the feed manager (tape-feed), the wire protocol (tape-protocol),
//! and consumers such as the tape-tap inspector.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod channel;
pub mod error;
pub mod state;
pub mod stats;

// Re-exports for convenience
pub use channel::ChannelId;
pub use error::UnknownChannelError;
pub use state::{aggregate_status, ChannelState};
pub use stats::ChannelStats;
