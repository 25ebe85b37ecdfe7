//! Cluster-facing read proxy.
//!
//! Reads prefer the local node whenever it owns the source; otherwise one
//! remote owner is picked uniformly at random, which balances load without
//! any shared state. Metadata is aggregated across the whole cluster and
//! memoized in short-TTL snapshot caches, so the frequent `meta` callers
//! (UIs, autoscalers) cost at most one fan-out per TTL window.

use crate::routing::LookupFn;
use crate::rpc::{EgressClient, RpcError};
use crate::types::{MetaRequest, MetaResponse, ReadRequest, ReadResponse};
use arc_swap::ArcSwapOption;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// TTL applied when the proxy is built without an explicit one.
pub const DEFAULT_META_CACHE_TTL: Duration = Duration::from_secs(1);

/// Atomically-published snapshot of a meta response.
///
/// Snapshots are immutable; a refresh swaps in a whole new one, so readers
/// observe either the old response or the new one, never a mix. An absent
/// snapshot reads as expired.
struct MetaCache {
    ttl: Duration,
    snapshot: ArcSwapOption<MetaSnapshot>,
}

struct MetaSnapshot {
    response: MetaResponse,
    fetched_at: Instant,
}

impl MetaCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: ArcSwapOption::const_empty(),
        }
    }

    fn get(&self) -> Option<MetaResponse> {
        let guard = self.snapshot.load();
        match guard.as_ref() {
            Some(s) if s.fetched_at.elapsed() < self.ttl => Some(s.response.clone()),
            _ => None,
        }
    }

    fn publish(&self, response: MetaResponse) {
        self.snapshot.store(Some(std::sync::Arc::new(MetaSnapshot {
            response,
            fetched_at: Instant::now(),
        })));
    }
}

pub struct EgressReverseProxy<E> {
    lookup: LookupFn,
    /// One client per node, parallel to the node address list;
    /// `clients[local_idx]` is backed by the local store reader.
    clients: Vec<E>,
    local_idx: usize,
    local_meta: MetaCache,
    cluster_meta: MetaCache,
}

impl<E: EgressClient> EgressReverseProxy<E> {
    pub fn new(lookup: LookupFn, clients: Vec<E>, local_idx: usize) -> Self {
        Self::with_meta_cache_ttl(lookup, clients, local_idx, DEFAULT_META_CACHE_TTL)
    }

    pub fn with_meta_cache_ttl(
        lookup: LookupFn,
        clients: Vec<E>,
        local_idx: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            lookup,
            clients,
            local_idx,
            local_meta: MetaCache::new(ttl),
            cluster_meta: MetaCache::new(ttl),
        }
    }

    /// Serve a read from the local store when this node owns the source,
    /// otherwise from a randomly chosen remote owner.
    ///
    /// A remote answering `Unavailable` yields an empty batch with no error:
    /// the node is transiently gone and the caller should simply retry.
    pub async fn read(&self, req: ReadRequest) -> Result<ReadResponse, RpcError> {
        let indices = (self.lookup)(&req.source_id);
        if indices.is_empty() {
            return Err(RpcError::Unavailable(
                "failed to find route for request. please try again".into(),
            ));
        }

        if indices.contains(&self.local_idx) {
            return self.clients[self.local_idx].read(req).await;
        }

        let idx = indices[rand::thread_rng().gen_range(0..indices.len())];
        match self.clients[idx].read(req).await {
            Err(RpcError::Unavailable(_)) => Ok(ReadResponse::default()),
            other => other,
        }
    }

    /// Serve per-source metadata, local-only or aggregated cluster-wide.
    pub async fn meta(&self, req: MetaRequest) -> Result<MetaResponse, RpcError> {
        if req.local_only {
            if let Some(resp) = self.local_meta.get() {
                return Ok(resp);
            }
            let resp = self.clients[self.local_idx].meta(req).await?;
            self.local_meta.publish(resp.clone());
            return Ok(resp);
        }

        if let Some(resp) = self.cluster_meta.get() {
            return Ok(resp);
        }

        // Collisions mean the same source shows up on several nodes during a
        // rebalance; either node's value is acceptable, so later clients win.
        let mut merged: HashMap<_, _> = HashMap::new();
        let mut any_ok = false;
        for (idx, client) in self.clients.iter().enumerate() {
            match client.meta(MetaRequest { local_only: true }).await {
                Ok(resp) => {
                    any_ok = true;
                    merged.extend(resp.meta);
                }
                Err(e) => warn!("failed to read meta from node {}: {}", idx, e),
            }
        }

        if !any_ok {
            return Err(RpcError::Internal(
                "failed to read meta data from remote node".into(),
            ));
        }

        let resp = MetaResponse { meta: merged };
        self.cluster_meta.publish(resp.clone());
        Ok(resp)
    }
}
