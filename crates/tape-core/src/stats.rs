//! Per-channel statistics snapshots.

use crate::state::ChannelState;
use serde::{Deserialize, Serialize};

/// Read-only snapshot of one channel's status, safe to poll.
///
/// Produced by the feed manager on request; never persisted, rebuilt from
/// scratch for every manager instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Current lifecycle state of the channel's connection.
    pub state: ChannelState,

    /// Count of well-formed messages delivered on this channel.
    pub message_count: u64,

    /// Count of inbound frames dropped because they failed to decode.
    pub decode_error_count: u64,

    /// Number of currently registered subscriber callbacks.
    pub subscriber_count: usize,

    /// Most recent transport error message, if any.
    pub last_error: Option<String>,
}
