//! Channel identifiers for the live-data streams.

use crate::error::UnknownChannelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Channel Identifier
// ============================================================================

/// Identifier for a live-data channel.
///
/// Channels form a small closed set fixed at compile time. Each channel
/// maps to one upstream stream endpoint and one wire-frame shape; the
/// catalog in tape-feed owns the endpoint mapping, the decoder table in
/// tape-protocol owns the frame shape.
///
/// String forms (used in config files, CLI arguments, and logs) are the
/// lowercase names: `"flow"`, `"gamma"`, `"quotes"`, `"portfolio"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    /// Options-flow prints (sweeps, blocks, splits).
    Flow,

    /// Dealer gamma-exposure snapshots per underlying.
    Gamma,

    /// Underlying quote ticks (bid/ask/last).
    Quotes,

    /// Brokerage portfolio updates (positions, equity).
    Portfolio,
}

impl ChannelId {
    /// All known channels, in display order.
    pub const ALL: [ChannelId; 4] = [
        ChannelId::Flow,
        ChannelId::Gamma,
        ChannelId::Quotes,
        ChannelId::Portfolio,
    ];

    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Flow => "flow",
            ChannelId::Gamma => "gamma",
            ChannelId::Quotes => "quotes",
            ChannelId::Portfolio => "portfolio",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = UnknownChannelError;

    /// Parses a channel name.
    ///
    /// Unknown names are a programming error at the call site (a typo in
    /// config or CLI input), so this fails with a typed error rather than
    /// falling back to any default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow" => Ok(ChannelId::Flow),
            "gamma" => Ok(ChannelId::Gamma),
            "quotes" => Ok(ChannelId::Quotes),
            "portfolio" => Ok(ChannelId::Portfolio),
            other => Err(UnknownChannelError {
                name: other.to_string(),
            }),
        }
    }
}
