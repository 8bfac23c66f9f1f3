//! Channel catalog: the static mapping from channel to endpoint address.

use crate::config::FeedConfig;
use std::collections::HashMap;
use tape_core::ChannelId;

/// Mapping from channel identifier to transport endpoint URL.
///
/// Built once from configuration when the manager is created and never
/// mutated afterwards. A channel absent from the catalog (disabled in
/// config) is indistinguishable from an unknown one: lookups return
/// `None` and subscribe calls must fail loudly rather than degrade.
#[derive(Debug, Clone)]
pub struct ChannelCatalog {
    endpoints: HashMap<ChannelId, String>,
}

impl ChannelCatalog {
    /// Builds the catalog from configuration.
    ///
    /// Every known channel gets the derived default endpoint
    /// `{stream_base_url}/v1/{channel}` unless the config overrides or
    /// disables it.
    pub fn from_config(config: &FeedConfig) -> Self {
        let base = config.stream_base_url.trim_end_matches('/');
        let mut endpoints = HashMap::new();

        for channel in ChannelId::ALL {
            if config.disabled.contains(&channel) {
                continue;
            }
            let url = config
                .endpoints
                .get(&channel)
                .cloned()
                .unwrap_or_else(|| format!("{base}/v1/{channel}"));
            endpoints.insert(channel, url);
        }

        Self { endpoints }
    }

    /// Returns the endpoint URL for a channel, or `None` if the channel
    /// is not in the catalog.
    pub fn endpoint_for(&self, channel: ChannelId) -> Option<&str> {
        self.endpoints.get(&channel).map(String::as_str)
    }

    /// Channels present in the catalog, in canonical order.
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        ChannelId::ALL
            .into_iter()
            .filter(|channel| self.endpoints.contains_key(channel))
    }

    /// Number of cataloged channels.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True if no channels are cataloged.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
