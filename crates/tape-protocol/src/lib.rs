//! Tape Protocol - Wire frames for the upstream market-data streams
//!
//! Each live-data channel carries one frame shape as JSON text. This crate
//! defines the typed frames, the `ChannelMessage` envelope handed to
//! subscribers, and the decode-function table the dispatcher uses to parse
//! inbound payloads exactly once per frame.

pub mod decode;
pub mod message;

// Re-exports for convenience
pub use decode::{decode_frame, decoder_for, DecodeError, DecodeFn};
pub use message::{
    ChannelMessage, FlowEvent, GammaLevel, GammaSnapshot, OptionType, PortfolioUpdate, Position,
    QuoteTick, TradeSide,
};
