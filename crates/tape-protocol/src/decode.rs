//! Per-channel frame decoding.
//!
//! The dispatcher parses every inbound payload exactly once, using the
//! decode function registered for the frame's channel. A frame that fails
//! to decode is rejected with a typed error; it is the caller's job to log
//! and drop it without disturbing the connection.

use crate::message::{ChannelMessage, FlowEvent, GammaSnapshot, PortfolioUpdate, QuoteTick};
use tape_core::ChannelId;
use thiserror::Error;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was empty. Upstream feeds occasionally emit keepalive
    /// frames with no body; these carry no message.
    #[error("empty frame on channel {channel}")]
    EmptyFrame { channel: ChannelId },

    /// The payload was not valid JSON for the channel's frame shape.
    #[error("malformed frame on channel {channel}: {source}")]
    Malformed {
        channel: ChannelId,
        #[source]
        source: serde_json::Error,
    },
}

/// A decode function: raw payload bytes to a typed channel message.
pub type DecodeFn = fn(&[u8]) -> Result<ChannelMessage, DecodeError>;

/// Returns the decode function for a channel.
///
/// This lookup is the only per-channel polymorphism in the feed layer;
/// everything else treats channels uniformly.
pub fn decoder_for(channel: ChannelId) -> DecodeFn {
    match channel {
        ChannelId::Flow => decode_flow,
        ChannelId::Gamma => decode_gamma,
        ChannelId::Quotes => decode_quote,
        ChannelId::Portfolio => decode_portfolio,
    }
}

/// Decodes one payload for the given channel.
pub fn decode_frame(channel: ChannelId, payload: &[u8]) -> Result<ChannelMessage, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyFrame { channel });
    }
    (decoder_for(channel))(payload)
}

fn decode_flow(payload: &[u8]) -> Result<ChannelMessage, DecodeError> {
    serde_json::from_slice::<FlowEvent>(payload)
        .map(ChannelMessage::Flow)
        .map_err(|source| DecodeError::Malformed {
            channel: ChannelId::Flow,
            source,
        })
}

fn decode_gamma(payload: &[u8]) -> Result<ChannelMessage, DecodeError> {
    serde_json::from_slice::<GammaSnapshot>(payload)
        .map(ChannelMessage::Gamma)
        .map_err(|source| DecodeError::Malformed {
            channel: ChannelId::Gamma,
            source,
        })
}

fn decode_quote(payload: &[u8]) -> Result<ChannelMessage, DecodeError> {
    serde_json::from_slice::<QuoteTick>(payload)
        .map(ChannelMessage::Quote)
        .map_err(|source| DecodeError::Malformed {
            channel: ChannelId::Quotes,
            source,
        })
}

fn decode_portfolio(payload: &[u8]) -> Result<ChannelMessage, DecodeError> {
    serde_json::from_slice::<PortfolioUpdate>(payload)
        .map(ChannelMessage::Portfolio)
        .map_err(|source| DecodeError::Malformed {
            channel: ChannelId::Portfolio,
            source,
        })
}
