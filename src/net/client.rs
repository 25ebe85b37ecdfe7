//! Outbound connection to one peer node.
//!
//! The connection is dialed lazily on first use and carries one request at a
//! time. Any I/O or decode failure drops it; the next call re-dials. Transport
//! failures surface as `Unavailable`, which the egress proxy treats as "peer
//! transiently gone" — the same classification a peer would report for
//! itself.

use super::message::{self, EnvelopeBatch, RangeAssignments, Request, Response};
use super::types::{CONNECT_TIMEOUT_SECS, PROTOCOL_MAGIC, PROTOCOL_VERSION};
use crate::rpc::{EgressClient, IngressClient, RpcError};
use crate::types::{
    MetaRequest, MetaResponse, Range, ReadRequest, ReadResponse, SendRequest, SetRangesRequest,
};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

pub struct PeerClient {
    addr: String,
    conn: Mutex<Option<TcpStream>>,
}

impl PeerClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(addr: &str) -> io::Result<TcpStream> {
        let mut stream = timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;

        let mut preamble = [0u8; 8];
        preamble[..4].copy_from_slice(&PROTOCOL_MAGIC);
        preamble[4..].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        stream.write_all(&preamble).await?;

        Ok(stream)
    }

    /// One request/response exchange. The connection lock serializes
    /// concurrent callers onto the single stream.
    async fn request(&self, req: &Request) -> Result<Response, RpcError> {
        let mut conn = self.conn.lock().await;

        if conn.is_none() {
            let stream = Self::connect(&self.addr)
                .await
                .map_err(|e| RpcError::Unavailable(format!("{}: {}", self.addr, e)))?;
            debug!("connected to {}", self.addr);
            *conn = Some(stream);
        }
        let Some(stream) = conn.as_mut() else {
            return Err(RpcError::Internal("connection missing after dial".into()));
        };

        match Self::exchange(stream, req).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                debug!("dropping connection to {}: {}", self.addr, e);
                *conn = None;
                Err(RpcError::Unavailable(format!("{}: {}", self.addr, e)))
            }
        }
    }

    async fn exchange(stream: &mut TcpStream, req: &Request) -> io::Result<Response> {
        message::write_frame(stream, req).await?;
        message::read_frame(stream).await
    }

    fn unexpected(resp: Response) -> RpcError {
        RpcError::Internal(format!("unexpected {} response", resp.command()))
    }

    // Scheduler-facing orchestration operations.

    pub async fn add_range(&self, range: Range) -> Result<(), RpcError> {
        match self.request(&Request::AddRange(range)).await? {
            Response::RangesUpdated => Ok(()),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn remove_range(&self, range: Range) -> Result<(), RpcError> {
        match self.request(&Request::RemoveRange(range)).await? {
            Response::RangesUpdated => Ok(()),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn list_ranges(&self) -> Result<Vec<Range>, RpcError> {
        match self.request(&Request::ListRanges).await? {
            Response::Ranges(list) => Ok(list.into_inner()),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn set_ranges(&self, req: SetRangesRequest) -> Result<(), RpcError> {
        let assignments = RangeAssignments::try_from(req)?;
        match self.request(&Request::SetRanges(assignments)).await? {
            Response::RangesUpdated => Ok(()),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }
}

impl IngressClient for PeerClient {
    async fn send(&self, req: SendRequest) -> Result<(), RpcError> {
        let envelopes = EnvelopeBatch::new(req.envelopes)
            .ok_or_else(|| RpcError::InvalidArgument("envelope batch too large".into()))?;
        let frame = Request::Send {
            local_only: req.local_only,
            envelopes,
        };
        match self.request(&frame).await? {
            Response::Send => Ok(()),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }
}

impl EgressClient for PeerClient {
    async fn read(&self, req: ReadRequest) -> Result<ReadResponse, RpcError> {
        match self.request(&Request::Read(req)).await? {
            Response::Read(batch) => Ok(ReadResponse {
                envelopes: batch.into_inner(),
            }),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }

    async fn meta(&self, req: MetaRequest) -> Result<MetaResponse, RpcError> {
        let frame = Request::Meta {
            local_only: req.local_only,
        };
        match self.request(&frame).await? {
            Response::Meta(map) => Ok(MetaResponse {
                meta: map.into_inner(),
            }),
            Response::Error { code, message } => Err(RpcError::from_wire(code, message)),
            other => Err(Self::unexpected(other)),
        }
    }
}
