//! RPC surface shared by the routing fabric and the wire layer.
//!
//! The fabric never talks to a transport directly; it is written against the
//! [`IngressClient`] and [`EgressClient`] capability traits. The wire layer
//! implements them for remote peers, and the local store reader implements
//! [`EgressClient`] so it can sit in the egress client vector as "this node".

use crate::types::{MetaRequest, MetaResponse, ReadRequest, ReadResponse, SendRequest};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Error classification carried across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The request is malformed; retrying without change cannot succeed.
    InvalidArgument,
    /// No node can serve the request right now; safe to retry.
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            RpcError::Unavailable(_) => ErrorCode::Unavailable,
            RpcError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RpcError::InvalidArgument(m)
            | RpcError::Unavailable(m)
            | RpcError::Internal(m) => m,
        }
    }

    pub fn from_wire(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::InvalidArgument => RpcError::InvalidArgument(message),
            ErrorCode::Unavailable => RpcError::Unavailable(message),
            ErrorCode::Internal => RpcError::Internal(message),
        }
    }
}

/// Write half of a cache node: accepts envelope batches.
pub trait IngressClient: Send + Sync {
    fn send(&self, req: SendRequest) -> impl Future<Output = Result<(), RpcError>> + Send;
}

/// Read half of a cache node: time-windowed reads and per-source metadata.
pub trait EgressClient: Send + Sync {
    fn read(&self, req: ReadRequest)
    -> impl Future<Output = Result<ReadResponse, RpcError>> + Send;

    fn meta(&self, req: MetaRequest)
    -> impl Future<Output = Result<MetaResponse, RpcError>> + Send;
}

impl<T: IngressClient> IngressClient for Arc<T> {
    fn send(&self, req: SendRequest) -> impl Future<Output = Result<(), RpcError>> + Send {
        T::send(self, req)
    }
}

impl<T: EgressClient> EgressClient for Arc<T> {
    fn read(
        &self,
        req: ReadRequest,
    ) -> impl Future<Output = Result<ReadResponse, RpcError>> + Send {
        T::read(self, req)
    }

    fn meta(
        &self,
        req: MetaRequest,
    ) -> impl Future<Output = Result<MetaResponse, RpcError>> + Send {
        T::meta(self, req)
    }
}
