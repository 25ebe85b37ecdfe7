//! Node assembly: store, routing table, proxies, and the RPC server wired
//! into one runnable unit.
//!
//! The client vectors handed to the proxies contain this node itself: the
//! local slot is backed directly by the store (ingress) and the validating
//! store reader (egress), every other slot by a peer connection. That keeps
//! the proxies oblivious to which slot is which beyond `local_idx`.

use crate::config::NodeConfig;
use crate::egress::{EgressReverseProxy, LocalStoreReader};
use crate::ingress::{BatchedIngressClient, IngressReverseProxy};
use crate::net::{PeerClient, RpcServer};
use crate::orchestration::OrchestratorAgent;
use crate::routing::{RoutingTable, default_hasher};
use crate::rpc::{EgressClient, IngressClient, RpcError};
use crate::store::{MemoryStore, StoreReader};
use crate::types::{MetaRequest, MetaResponse, ReadRequest, ReadResponse, SendRequest};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node index {index} outside the {count}-node address list")]
    BadNodeIndex { index: usize, count: usize },
}

/// Ingress client for one slot of the cluster: the local store, or a
/// batched writer over the wire.
pub enum NodeIngressClient {
    Local(Arc<MemoryStore>),
    Remote(BatchedIngressClient),
}

impl IngressClient for NodeIngressClient {
    async fn send(&self, req: SendRequest) -> Result<(), RpcError> {
        match self {
            NodeIngressClient::Local(store) => {
                for envelope in req.envelopes {
                    store.put(envelope);
                }
                Ok(())
            }
            NodeIngressClient::Remote(client) => client.send(req).await,
        }
    }
}

/// Egress client for one slot of the cluster: the validating local reader,
/// or a peer connection.
pub enum NodeEgressClient {
    Local(LocalStoreReader<MemoryStore>),
    Remote(Arc<PeerClient>),
}

impl EgressClient for NodeEgressClient {
    async fn read(&self, req: ReadRequest) -> Result<ReadResponse, RpcError> {
        match self {
            NodeEgressClient::Local(reader) => reader.read(req).await,
            NodeEgressClient::Remote(client) => client.read(req).await,
        }
    }

    async fn meta(&self, req: MetaRequest) -> Result<MetaResponse, RpcError> {
        match self {
            NodeEgressClient::Local(reader) => reader.meta(req).await,
            NodeEgressClient::Remote(client) => client.meta(req).await,
        }
    }
}

/// Counters surfaced by the status loop.
#[derive(Debug, Clone, Copy)]
pub struct NodeStats {
    pub sources: usize,
    pub dropped: u64,
    pub send_failures: u64,
}

pub struct Node {
    config: NodeConfig,
    store: Arc<MemoryStore>,
    server: Arc<RpcServer<NodeIngressClient, NodeEgressClient, RoutingTable>>,
    dropped: Arc<AtomicU64>,
    send_failure: Arc<AtomicU64>,
}

impl Node {
    /// Wire up a node. Must run inside a tokio runtime: the per-peer
    /// batchers spawn their background tasks here.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let count = config.node_addrs.len();
        if config.node_index >= count {
            return Err(NodeError::BadNodeIndex {
                index: config.node_index,
                count,
            });
        }
        let local_idx = config.node_index;

        let store = Arc::new(MemoryStore::new(
            config.max_envelopes_per_source,
            config.max_sources,
        ));
        let routing = Arc::new(RoutingTable::new(&config.node_addrs, default_hasher()));
        let dropped = Arc::new(AtomicU64::new(0));
        let send_failure = Arc::new(AtomicU64::new(0));

        let mut ingress_clients = Vec::with_capacity(count);
        let mut egress_clients = Vec::with_capacity(count);
        for (idx, addr) in config.node_addrs.iter().enumerate() {
            if idx == local_idx {
                ingress_clients.push(NodeIngressClient::Local(Arc::clone(&store)));
                egress_clients.push(NodeEgressClient::Local(LocalStoreReader::new(
                    Arc::clone(&store),
                )));
            } else {
                let peer = Arc::new(PeerClient::new(addr.clone()));
                ingress_clients.push(NodeIngressClient::Remote(BatchedIngressClient::new(
                    config.batch.clone(),
                    Arc::clone(&peer),
                    Arc::clone(&dropped),
                    Arc::clone(&send_failure),
                )));
                egress_clients.push(NodeEgressClient::Remote(peer));
            }
        }

        let ingress = Arc::new(IngressReverseProxy::new(
            routing.lookup_fn(),
            ingress_clients,
            local_idx,
        ));
        let egress = Arc::new(EgressReverseProxy::with_meta_cache_ttl(
            routing.lookup_fn(),
            egress_clients,
            local_idx,
            config.meta_cache_ttl,
        ));
        let orchestrator = Arc::new(OrchestratorAgent::new(routing));
        let server = Arc::new(RpcServer::new(ingress, egress, orchestrator));

        Ok(Self {
            config,
            store,
            server,
            dropped,
            send_failure,
        })
    }

    /// Bind this node's address and serve until the listener fails.
    pub async fn run(&self) -> io::Result<()> {
        let addr = &self.config.node_addrs[self.config.node_index];
        let listener = TcpListener::bind(addr).await?;
        info!(
            "listening on {} as node {} of {}",
            addr,
            self.config.node_index,
            self.config.node_addrs.len()
        );
        Arc::clone(&self.server).run(listener).await
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            sources: self.store.meta().len(),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_failures: self.send_failure.load(Ordering::Relaxed),
        }
    }
}
