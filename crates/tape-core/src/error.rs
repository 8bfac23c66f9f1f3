//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// A channel name did not match any known channel.
///
/// Raised when parsing channel names from strings (config, CLI) and when
/// the catalog has no endpoint for a requested channel. Call sites must
/// treat this as a programming error and fail the operation loudly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown channel: {name}")]
pub struct UnknownChannelError {
    /// The name that failed to resolve.
    pub name: String,
}
