//! Cache node binary.
//!
//! Joins the node cluster named by `--addrs`, listens on its own slot's
//! address, and serves ingress, egress, and orchestration RPCs until
//! interrupted. Range assignments arrive from the external scheduler over
//! the orchestration surface; a freshly started node owns nothing.

use clap::Parser;
use logcache::config::NodeConfig;
use logcache::ingress::BatchConfig;
use logcache::node::Node;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "logcache", version, about = "Sharded in-memory telemetry cache node")]
struct Args {
    /// Cluster node addresses in routing order (comma-separated host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addrs: String,

    /// This node's position in the address list
    #[arg(short, long, default_value = "0")]
    node_index: usize,

    /// Envelopes per forwarded ingress batch
    #[arg(long, default_value = "100")]
    batch_size: usize,

    /// Ingress flush interval in milliseconds
    #[arg(long, default_value = "250")]
    flush_interval_ms: u64,

    /// Meta cache TTL in milliseconds
    #[arg(long, default_value = "1000")]
    meta_cache_ttl_ms: u64,

    /// Envelopes kept per source before the oldest expire
    #[arg(long, default_value = "100000")]
    max_per_source: usize,

    /// Distinct sources tracked before new ones are refused
    #[arg(long, default_value = "100000")]
    max_sources: usize,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("logcache=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let node_addrs: Vec<String> = args
        .addrs
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let config = NodeConfig {
        node_addrs,
        node_index: args.node_index,
        batch: BatchConfig {
            batch_size: args.batch_size,
            flush_interval: Duration::from_millis(args.flush_interval_ms),
            local_only_disabled: false,
        },
        meta_cache_ttl: Duration::from_millis(args.meta_cache_ttl_ms),
        max_envelopes_per_source: args.max_per_source,
        max_sources: args.max_sources,
    };

    info!("logcache v{} | node {} of {}", VERSION, config.node_index, config.node_addrs.len());

    let node = match Node::new(config) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!("invalid configuration: {}", e);
            return;
        }
    };

    // Status printer
    let status_node = node.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = status_node.stats();
            info!(
                "Status: {} sources | {} dropped | {} send failures",
                stats.sources, stats.dropped, stats.send_failures
            );
        }
    });

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }
}
