//! Sharded in-memory cache of telemetry envelopes.
//!
//! A cluster of these nodes appears as one logical store: envelopes are
//! routed to owners by a consistent hash of their source identifier, writes
//! fan out through the ingress proxy, and reads prefer the local node or
//! scatter to a random remote owner.

pub mod config;
pub mod egress;
pub mod ingress;
pub mod net;
pub mod node;
pub mod orchestration;
pub mod routing;
pub mod rpc;
pub mod store;
pub mod types;

// Re-exports
pub use config::NodeConfig;
pub use egress::{EgressReverseProxy, LocalStoreReader};
pub use ingress::{BatchConfig, BatchedIngressClient, IngressReverseProxy};
pub use net::{PeerClient, RpcServer};
pub use node::{Node, NodeEgressClient, NodeIngressClient, NodeStats};
pub use orchestration::{OrchestratorAgent, RangeSetter};
pub use routing::{HashFn, LookupFn, RoutingTable, default_hasher};
pub use rpc::{EgressClient, ErrorCode, IngressClient, RpcError};
pub use store::{MemoryStore, StoreReader};
pub use types::*;
