//! Ingress path: batched writes and the per-node fan-out proxy.

pub mod batch;
pub mod proxy;

pub use batch::{BatchConfig, BatchedIngressClient};
pub use proxy::IngressReverseProxy;
