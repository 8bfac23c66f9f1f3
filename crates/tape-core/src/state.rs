//! Per-channel connection states and the global status aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Channel State
// ============================================================================

/// Lifecycle state of a channel's transport connection.
///
/// The state machine is driven exclusively by the feed manager:
///
/// ```text
/// Disconnected ──ensure_connected──▶ Connecting ──handshake──▶ Connected
///       ▲                               │                         │
///       │                               │ transport error         │
///       │                               ▼                         │
///       └─────────disconnect────────── Error ◀────────────────────┘
/// ```
///
/// `Error` is sticky: the manager never leaves it on its own, recovery
/// requires an explicit reconnect (or the opt-in retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// No connection exists. Initial and terminal state.
    #[default]
    Disconnected,

    /// A connection attempt is in flight (handshake not complete).
    Connecting,

    /// The transport handshake succeeded; frames may arrive.
    Connected,

    /// The transport reported an error; the connection is unusable.
    Error,
}

impl ChannelState {
    /// Short lowercase label for logs and status displays.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Error => "error",
        }
    }

    /// Returns true if a transport task is (or may still be) alive.
    pub fn is_active(&self) -> bool {
        matches!(self, ChannelState::Connecting | ChannelState::Connected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Status Aggregation
// ============================================================================

/// Derives one global status from a set of per-channel states.
///
/// Priority order, not a quorum: `Connected` if any channel is connected,
/// else `Connecting` if any is connecting, else `Error` if any errored,
/// else `Disconnected`. A single healthy channel masks others being down;
/// the aggregate answers "is the live-data layer usable at all", not
/// "are all channels healthy".
pub fn aggregate_status<I>(states: I) -> ChannelState
where
    I: IntoIterator<Item = ChannelState>,
{
    let mut result = ChannelState::Disconnected;
    for state in states {
        match state {
            ChannelState::Connected => return ChannelState::Connected,
            ChannelState::Connecting => result = ChannelState::Connecting,
            ChannelState::Error => {
                if result != ChannelState::Connecting {
                    result = ChannelState::Error;
                }
            }
            ChannelState::Disconnected => {}
        }
    }
    result
}
