//! Typed wire frames for each live-data channel.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tape_core::ChannelId;

// ============================================================================
// Field Enums
// ============================================================================

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// Aggressor side of a print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

// ============================================================================
// Frame Shapes (one per channel)
// ============================================================================

/// One options-flow print on the `flow` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    /// Exchange timestamp of the print.
    pub ts: DateTime<Utc>,
    /// Underlying ticker symbol.
    pub symbol: String,
    pub option_type: OptionType,
    pub side: TradeSide,
    pub strike: f64,
    /// Contract expiration date.
    pub expiry: NaiveDate,
    /// Number of contracts.
    pub size: u64,
    /// Total premium paid, in dollars.
    pub premium: f64,
    /// Reporting venue, when the upstream identifies one.
    #[serde(default)]
    pub venue: Option<String>,
    /// Whether the print was flagged as an intermarket sweep.
    #[serde(default)]
    pub sweep: bool,
}

/// One strike level inside a gamma-exposure snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaLevel {
    pub strike: f64,
    /// Net dealer gamma at this strike, in dollars per 1% move.
    pub net_gamma: f64,
    #[serde(default)]
    pub call_oi: u64,
    #[serde(default)]
    pub put_oi: u64,
}

/// Full gamma-exposure snapshot for one underlying on the `gamma` channel.
///
/// Snapshots replace each other; consumers keep only the latest per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaSnapshot {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    /// Spot price the snapshot was computed against.
    pub spot: f64,
    pub levels: Vec<GammaLevel>,
}

/// Quote tick for one underlying on the `quotes` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    #[serde(default)]
    pub volume: u64,
}

/// One open position inside a portfolio update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed quantity (negative for short).
    pub qty: f64,
    pub avg_price: f64,
    pub mark: f64,
    pub unrealized_pnl: f64,
}

/// Brokerage account state on the `portfolio` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioUpdate {
    pub ts: DateTime<Utc>,
    pub account: String,
    pub equity: f64,
    pub buying_power: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
}

// ============================================================================
// Channel Message Envelope
// ============================================================================

/// A decoded inbound message, tagged with its channel's frame type.
///
/// This is what subscriber callbacks receive. The variant always matches
/// the channel the subscription was made on; the dispatcher decodes each
/// frame with that channel's decoder before fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Flow(FlowEvent),
    Gamma(GammaSnapshot),
    Quote(QuoteTick),
    Portfolio(PortfolioUpdate),
}

impl ChannelMessage {
    /// The channel this message arrived on.
    pub fn channel(&self) -> ChannelId {
        match self {
            ChannelMessage::Flow(_) => ChannelId::Flow,
            ChannelMessage::Gamma(_) => ChannelId::Gamma,
            ChannelMessage::Quote(_) => ChannelId::Quotes,
            ChannelMessage::Portfolio(_) => ChannelId::Portfolio,
        }
    }

    /// Exchange timestamp carried by the frame.
    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            ChannelMessage::Flow(f) => f.ts,
            ChannelMessage::Gamma(g) => g.ts,
            ChannelMessage::Quote(q) => q.ts,
            ChannelMessage::Portfolio(p) => p.ts,
        }
    }
}
