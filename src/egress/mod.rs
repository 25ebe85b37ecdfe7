//! Egress path: local store reads and the cluster-facing read proxy.

pub mod local;
pub mod proxy;

pub use local::LocalStoreReader;
pub use proxy::EgressReverseProxy;
