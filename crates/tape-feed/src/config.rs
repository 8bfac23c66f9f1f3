//! Feed manager configuration.
//!
//! Loaded from a TOML file or constructed in code; every field has a
//! default so an empty config is valid.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tape_core::ChannelId;
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the feed manager.
///
/// # Example (TOML)
///
/// ```toml
/// stream_base_url = "wss://stream.tapedash.io"
/// reconnect_delay_ms = 250
/// disabled = ["portfolio"]
///
/// [endpoints]
/// quotes = "wss://quotes-direct.tapedash.io/v2"
///
/// [retry]
/// auto_retry = true
/// initial_delay_ms = 1000
/// max_delay_ms = 30000
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Base URL for the upstream stream gateway. Per-channel endpoints
    /// default to `{stream_base_url}/v1/{channel}`.
    pub stream_base_url: String,

    /// Whether the enablement gate starts open.
    pub start_enabled: bool,

    /// Delay between `disconnect` and the follow-up connect during a
    /// reconnect, letting the prior socket release its resources.
    pub reconnect_delay_ms: u64,

    /// Optional bound on the transport handshake. Absent means a
    /// connection attempt may stay in `Connecting` indefinitely.
    pub connect_timeout_ms: Option<u64>,

    /// Channels removed from the catalog for this deployment. Subscribing
    /// to a disabled channel fails the same way an unknown one does.
    pub disabled: Vec<ChannelId>,

    /// Per-channel endpoint overrides (full URLs), taking precedence over
    /// the `stream_base_url` derivation.
    pub endpoints: HashMap<ChannelId, String>,

    /// Automatic reconnection policy. Off by default; when off, recovery
    /// from transport failures requires an explicit reconnect.
    pub retry: RetryPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            stream_base_url: "wss://stream.tapedash.io".to_string(),
            start_enabled: true,
            reconnect_delay_ms: 250,
            connect_timeout_ms: None,
            disabled: Vec::new(),
            endpoints: HashMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl FeedConfig {
    /// Loads configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Connect timeout as a `Duration`, when configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Automatic reconnection policy applied while a failed or closed channel
/// still has subscribers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Master switch. When false the other fields are ignored.
    pub auto_retry: bool,

    /// Delay before the first retry attempt.
    pub initial_delay_ms: u64,

    /// Upper bound on the backoff delay.
    pub max_delay_ms: u64,

    /// Maximum consecutive attempts before giving up (0 = unlimited).
    /// The counter resets on every successful connect.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_retry: false,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 0,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given zero-based attempt number.
    ///
    /// Doubles per attempt, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Shift capped well below 64 to avoid overflow on long outages.
        let factor = 1u64 << attempt.min(16);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// True once `attempt` has exhausted the configured budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = FeedConfig::default();
        assert_eq!(config.stream_base_url, "wss://stream.tapedash.io");
        assert!(config.start_enabled);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        assert!(config.connect_timeout().is_none());
        assert!(config.disabled.is_empty());
        assert!(!config.retry.auto_retry);
    }

    #[test]
    fn test_config_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
stream_base_url = "wss://stage.tapedash.io"
reconnect_delay_ms = 50
connect_timeout_ms = 5000
disabled = ["portfolio"]

[endpoints]
quotes = "wss://quotes-direct.tapedash.io/v2"

[retry]
auto_retry = true
initial_delay_ms = 500
max_delay_ms = 8000
max_attempts = 5
"#
        )
        .unwrap();

        let config = FeedConfig::from_path(file.path()).unwrap();
        assert_eq!(config.stream_base_url, "wss://stage.tapedash.io");
        assert_eq!(config.reconnect_delay_ms, 50);
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.disabled, vec![ChannelId::Portfolio]);
        assert_eq!(
            config.endpoints.get(&ChannelId::Quotes).map(String::as_str),
            Some("wss://quotes-direct.tapedash.io/v2")
        );
        assert!(config.retry.auto_retry);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_config_empty_file_uses_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = FeedConfig::from_path(file.path()).unwrap();
        assert_eq!(config.stream_base_url, FeedConfig::default().stream_base_url);
    }

    #[test]
    fn test_config_missing_file() {
        let result = FeedConfig::from_path(Path::new("/nonexistent/tape.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "stream_base_url = [not valid").unwrap();

        let result = FeedConfig::from_path(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            auto_retry: true,
            initial_delay_ms: 1_000,
            max_delay_ms: 8_000,
            max_attempts: 0,
        };

        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        // Capped from here on
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(60), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_exhaustion() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));

        let unlimited = RetryPolicy::default();
        assert!(!unlimited.is_exhausted(u32::MAX));
    }
}
