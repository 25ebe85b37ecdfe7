//! Wire layer: framing, bounded decoding, and the peer client/server pair.

pub mod client;
pub mod message;
pub mod serde_safe;
pub mod server;
pub mod types;

pub use client::PeerClient;
pub use message::{EnvelopeBatch, MetaMap, RangeAssignments, RangeList, Request, Response};
pub use serde_safe::{
    BoundedMap, BoundedVec, MAX_BATCH_ENVELOPES, MAX_META_SOURCES, MAX_NODES,
    MAX_RANGES_PER_NODE,
};
pub use server::RpcServer;
pub use types::{
    CONNECT_TIMEOUT_SECS, DEFAULT_PORT, MESSAGE_SIZE_LIMIT, PREAMBLE_TIMEOUT_SECS,
    PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
