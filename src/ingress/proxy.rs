//! Ingress fan-out: split a heterogeneous batch by owning node.
//!
//! Every forwarded batch carries `local_only = true`, so a receiving node
//! writes it straight to its store instead of routing again; that short
//! circuit is what keeps two nodes from bouncing a batch back and forth
//! during a range handoff.

use crate::routing::LookupFn;
use crate::rpc::{IngressClient, RpcError};
use crate::types::{Envelope, SendRequest};
use std::collections::BTreeMap;
use tracing::warn;

pub struct IngressReverseProxy<I> {
    lookup: LookupFn,
    /// One client per node, parallel to the node address list;
    /// `clients[local_idx]` writes to the local store.
    clients: Vec<I>,
    local_idx: usize,
}

impl<I: IngressClient> IngressReverseProxy<I> {
    pub fn new(lookup: LookupFn, clients: Vec<I>, local_idx: usize) -> Self {
        Self {
            lookup,
            clients,
            local_idx,
        }
    }

    /// Accept a batch and dispatch each envelope to every node owning its
    /// source. Envelopes no node owns are dropped. Per-target failures are
    /// logged and swallowed; the batch was already accepted and the
    /// upstream batcher's failure counter is the authoritative signal.
    pub async fn send(&self, req: SendRequest) -> Result<(), RpcError> {
        if req.local_only {
            return self.clients[self.local_idx].send(req).await;
        }

        let mut grouped: BTreeMap<usize, Vec<Envelope>> = BTreeMap::new();
        for envelope in req.envelopes {
            for idx in (self.lookup)(&envelope.source_id) {
                grouped.entry(idx).or_default().push(envelope.clone());
            }
        }

        for (idx, envelopes) in grouped {
            let forward = SendRequest {
                local_only: true,
                envelopes,
            };
            if let Err(e) = self.clients[idx].send(forward).await {
                warn!("failed to forward envelopes to node {}: {}", idx, e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogStream, Payload};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeIngress {
        requests: Mutex<Vec<SendRequest>>,
        fail: bool,
    }

    impl FakeIngress {
        fn failing() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn requests(&self) -> Vec<SendRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl IngressClient for FakeIngress {
        async fn send(&self, req: SendRequest) -> Result<(), RpcError> {
            self.requests.lock().unwrap().push(req);
            if self.fail {
                Err(RpcError::Unavailable("down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn envelope(source_id: &str, timestamp: i64) -> Envelope {
        Envelope {
            timestamp,
            source_id: source_id.into(),
            instance_id: "0".into(),
            tags: HashMap::new(),
            payload: Payload::Log {
                payload: b"line".to_vec(),
                stream: LogStream::Stdout,
            },
        }
    }

    /// Routes "a" to node 0, "b" to node 1, "c" to both.
    fn split_lookup() -> LookupFn {
        Arc::new(|source_id| match source_id {
            "a" => vec![0],
            "b" => vec![1],
            "c" => vec![0, 1],
            _ => vec![],
        })
    }

    #[tokio::test]
    async fn splits_batches_by_owning_node() {
        let clients = vec![
            Arc::new(FakeIngress::default()),
            Arc::new(FakeIngress::default()),
        ];
        let proxy = IngressReverseProxy::new(split_lookup(), clients.clone(), 1);

        proxy
            .send(SendRequest {
                local_only: false,
                envelopes: vec![envelope("a", 1), envelope("b", 2), envelope("c", 3)],
            })
            .await
            .unwrap();

        let to_zero = clients[0].requests();
        assert_eq!(to_zero.len(), 1);
        assert!(to_zero[0].local_only);
        assert_eq!(
            to_zero[0].envelopes,
            vec![envelope("a", 1), envelope("c", 3)]
        );

        let to_one = clients[1].requests();
        assert_eq!(to_one.len(), 1);
        assert!(to_one[0].local_only);
        assert_eq!(to_one[0].envelopes, vec![envelope("b", 2), envelope("c", 3)]);
    }

    #[tokio::test]
    async fn local_only_short_circuits_to_the_local_client() {
        let clients = vec![
            Arc::new(FakeIngress::default()),
            Arc::new(FakeIngress::default()),
        ];
        // Lookup would route "a" to node 0; local-only must ignore it.
        let proxy = IngressReverseProxy::new(split_lookup(), clients.clone(), 1);

        let req = SendRequest {
            local_only: true,
            envelopes: vec![envelope("a", 1)],
        };
        proxy.send(req.clone()).await.unwrap();

        assert!(clients[0].requests().is_empty());
        assert_eq!(clients[1].requests(), vec![req]);
    }

    #[tokio::test]
    async fn unroutable_envelopes_are_dropped_silently() {
        let clients = vec![
            Arc::new(FakeIngress::default()),
            Arc::new(FakeIngress::default()),
        ];
        let proxy = IngressReverseProxy::new(split_lookup(), clients.clone(), 0);

        proxy
            .send(SendRequest {
                local_only: false,
                envelopes: vec![envelope("unknown", 1)],
            })
            .await
            .unwrap();

        assert!(clients[0].requests().is_empty());
        assert!(clients[1].requests().is_empty());
    }

    #[tokio::test]
    async fn per_target_failures_do_not_abort_the_batch() {
        let clients = vec![
            Arc::new(FakeIngress::failing()),
            Arc::new(FakeIngress::default()),
        ];
        let proxy = IngressReverseProxy::new(split_lookup(), clients.clone(), 0);

        proxy
            .send(SendRequest {
                local_only: false,
                envelopes: vec![envelope("a", 1), envelope("b", 2)],
            })
            .await
            .unwrap();

        // Node 0 failed, node 1 still got its share.
        assert_eq!(clients[0].requests().len(), 1);
        assert_eq!(clients[1].requests().len(), 1);
    }
}
