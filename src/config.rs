//! Node configuration.

use crate::egress::proxy::DEFAULT_META_CACHE_TTL;
use crate::ingress::BatchConfig;
use crate::net::DEFAULT_PORT;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Ordered cluster addresses, fixed at startup. Routing node indices are
    /// positions in this list, so it must be identical on every node.
    pub node_addrs: Vec<String>,
    /// This node's position in `node_addrs`; doubles as the listen address.
    pub node_index: usize,
    /// Batching applied to writes forwarded to peers.
    pub batch: BatchConfig,
    pub meta_cache_ttl: Duration,
    /// Envelopes kept per source before the oldest expire.
    pub max_envelopes_per_source: usize,
    /// Distinct sources tracked before new ones are refused.
    pub max_sources: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_addrs: vec![format!("127.0.0.1:{}", DEFAULT_PORT)],
            node_index: 0,
            batch: BatchConfig::default(),
            meta_cache_ttl: DEFAULT_META_CACHE_TTL,
            max_envelopes_per_source: 100_000,
            max_sources: 100_000,
        }
    }
}
