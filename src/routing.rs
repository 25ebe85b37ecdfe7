//! Consistent-hash routing table mapping source identifiers to owning nodes.
//!
//! The table holds inclusive ranges over the full 64-bit keyspace, each tagged
//! with the index of the node that owns it. Ranges may overlap (replication);
//! a lookup returns every owner of the hashed key. The whole table is replaced
//! wholesale by the scheduler through [`RoutingTable::set_ranges`]; lookups
//! observe either the old table or the new one, never a mix.

use crate::orchestration::RangeSetter;
use crate::types::{Range, SetRangesRequest};
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::Hasher as _;
use std::sync::{Arc, RwLock};

/// Routing lookup injected into the proxies: source identifier to owning
/// node indices.
pub type LookupFn = Arc<dyn Fn(&str) -> Vec<usize> + Send + Sync>;

/// Hash function routing keys by. Must be identical (function and seed) on
/// every node in the cluster, or routing diverges.
pub type HashFn = Box<dyn Fn(&str) -> u64 + Send + Sync>;

/// Default cluster hasher: SipHash-1-3 with a fixed zero key.
pub fn default_hasher() -> HashFn {
    Box::new(|source_id| {
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        hasher.write(source_id.as_bytes());
        hasher.finish()
    })
}

/// A range together with its owning node index. Tables are kept sorted by
/// `(start asc, node_index desc)` so that the highest-index replica of an
/// identical range is probed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeInfo {
    range: Range,
    node_index: usize,
}

pub struct RoutingTable {
    /// Startup-fixed node address list, mapping addresses to indices.
    addrs: HashMap<String, usize>,
    table: RwLock<Vec<RangeInfo>>,
    hasher: HashFn,
}

impl RoutingTable {
    pub fn new(node_addrs: &[String], hasher: HashFn) -> Self {
        let addrs = node_addrs
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i))
            .collect();

        Self {
            addrs,
            table: RwLock::new(Vec::new()),
            hasher,
        }
    }

    /// Every node owning the key the source hashes to, in table order, each
    /// node at most once. Empty when no range contains the key.
    pub fn lookup(&self, source_id: &str) -> Vec<usize> {
        let h = (self.hasher)(source_id);
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        let mut result = Vec::new();
        for info in table.iter() {
            if info.range.contains(h) && !result.contains(&info.node_index) {
                result.push(info.node_index);
            }
        }
        result
    }

    /// Every containing range's owner in table order, one entry per range.
    ///
    /// A node owning several containing ranges appears once per range;
    /// callers that need distinct nodes must deduplicate.
    pub fn lookup_all(&self, source_id: &str) -> Vec<usize> {
        let h = (self.hasher)(source_id);
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());

        table
            .iter()
            .filter(|info| info.range.contains(h))
            .map(|info| info.node_index)
            .collect()
    }

    /// Lookup closure handed to the proxies.
    pub fn lookup_fn(self: &Arc<Self>) -> LookupFn {
        let table = Arc::clone(self);
        Arc::new(move |source_id| table.lookup(source_id))
    }
}

impl RangeSetter for RoutingTable {
    /// Atomically replace the table with the scheduler's assignment.
    ///
    /// Addresses not in the startup node list map to index 0; the scheduler
    /// is trusted to name only known addresses.
    fn set_ranges(&self, req: &SetRangesRequest) {
        let mut table = Vec::new();
        for (addr, ranges) in &req.ranges {
            let node_index = self.addrs.get(addr).copied().unwrap_or(0);
            for range in ranges {
                table.push(RangeInfo {
                    range: *range,
                    node_index,
                });
            }
        }

        table.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then(b.node_index.cmp(&a.node_index))
        });

        *self.table.write().unwrap_or_else(|e| e.into_inner()) = table;
    }
}
