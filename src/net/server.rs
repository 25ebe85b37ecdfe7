//! RPC server: accepts peer and consumer connections and dispatches frames
//! onto the proxies and the orchestrator agent.

use super::message::{self, EnvelopeBatch, MetaMap, RangeList, Request, Response};
use super::types::{PREAMBLE_TIMEOUT_SECS, PROTOCOL_MAGIC, PROTOCOL_VERSION};
use crate::egress::EgressReverseProxy;
use crate::ingress::IngressReverseProxy;
use crate::orchestration::{OrchestratorAgent, RangeSetter};
use crate::rpc::{EgressClient, IngressClient, RpcError};
use crate::types::{MetaRequest, SendRequest, SetRangesRequest};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::debug;

pub struct RpcServer<I, E, S> {
    ingress: Arc<IngressReverseProxy<I>>,
    egress: Arc<EgressReverseProxy<E>>,
    orchestrator: Arc<OrchestratorAgent<S>>,
}

impl<I, E, S> RpcServer<I, E, S>
where
    I: IngressClient + 'static,
    E: EgressClient + 'static,
    S: RangeSetter + 'static,
{
    pub fn new(
        ingress: Arc<IngressReverseProxy<I>>,
        egress: Arc<EgressReverseProxy<E>>,
        orchestrator: Arc<OrchestratorAgent<S>>,
    ) -> Self {
        Self {
            ingress,
            egress,
            orchestrator,
        }
    }

    /// Accept loop. One task per connection; a connection serves frames
    /// until its client hangs up.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.serve_connection(stream).await {
                    debug!("connection from {} ended: {}", peer, e);
                }
            });
        }
    }

    async fn serve_connection(&self, mut stream: TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;

        let mut preamble = [0u8; 8];
        timeout(
            Duration::from_secs(PREAMBLE_TIMEOUT_SECS),
            stream.read_exact(&mut preamble),
        )
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "preamble timed out"))??;

        if preamble[..4] != PROTOCOL_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
        }
        let version = u32::from_le_bytes([preamble[4], preamble[5], preamble[6], preamble[7]]);
        if version != PROTOCOL_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported protocol version {}", version),
            ));
        }

        loop {
            let req: Request = match message::read_frame(&mut stream).await {
                Ok(req) => req,
                // Clean close between frames.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };
            let resp = self.dispatch(req).await;
            message::write_frame(&mut stream, &resp).await?;
        }
    }

    async fn dispatch(&self, req: Request) -> Response {
        match req {
            Request::Send {
                local_only,
                envelopes,
            } => {
                let req = SendRequest {
                    local_only,
                    envelopes: envelopes.into_inner(),
                };
                match self.ingress.send(req).await {
                    Ok(()) => Response::Send,
                    Err(e) => Response::from(&e),
                }
            }

            Request::Read(req) => match self.egress.read(req).await {
                Ok(resp) => match EnvelopeBatch::new(resp.envelopes) {
                    Some(batch) => Response::Read(batch),
                    None => Response::from(&RpcError::Internal(
                        "read result exceeds the batch bound".into(),
                    )),
                },
                Err(e) => Response::from(&e),
            },

            Request::Meta { local_only } => {
                match self.egress.meta(MetaRequest { local_only }).await {
                    Ok(resp) => match MetaMap::new(resp.meta) {
                        Some(map) => Response::Meta(map),
                        None => Response::from(&RpcError::Internal(
                            "meta result exceeds the source bound".into(),
                        )),
                    },
                    Err(e) => Response::from(&e),
                }
            }

            Request::AddRange(range) => {
                self.orchestrator.add_range(range);
                Response::RangesUpdated
            }

            Request::RemoveRange(range) => {
                self.orchestrator.remove_range(range);
                Response::RangesUpdated
            }

            Request::ListRanges => match RangeList::new(self.orchestrator.list_ranges()) {
                Some(list) => Response::Ranges(list),
                None => Response::from(&RpcError::Internal(
                    "owned ranges exceed the list bound".into(),
                )),
            },

            Request::SetRanges(assignments) => {
                self.orchestrator
                    .set_ranges(&SetRangesRequest::from(assignments));
                Response::RangesUpdated
            }
        }
    }
}
