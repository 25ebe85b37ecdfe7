//! In-memory envelope storage indexed by source identifier and timestamp.
//!
//! Each source keeps its envelopes in timestamp order with a fixed cap;
//! accepting an envelope beyond the cap evicts the oldest one and counts it
//! as expired. A global bound on the number of tracked sources keeps a
//! misbehaving producer from exhausting the node.

use crate::types::{Envelope, EnvelopeType, MetaInfo};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::debug;

/// Read capability the egress path is written against.
pub trait StoreReader: Send + Sync {
    /// Envelopes for `source_id` with timestamps in `[start, end)`, filtered
    /// by type and metric name, capped at `limit`.
    #[allow(clippy::too_many_arguments)]
    fn get(
        &self,
        source_id: &str,
        start: i64,
        end: i64,
        envelope_types: Option<&[EnvelopeType]>,
        name_filter: Option<&Regex>,
        limit: usize,
        descending: bool,
    ) -> Vec<Envelope>;

    /// Per-source accounting for everything currently held.
    fn meta(&self) -> HashMap<String, MetaInfo>;
}

/// Envelopes of one source, keyed by `(timestamp, arrival_seq)` so that
/// envelopes sharing a timestamp are kept and drain in arrival order.
#[derive(Debug, Default)]
struct SourceBucket {
    envelopes: BTreeMap<(i64, u64), Envelope>,
    seq: u64,
    expired: u64,
}

#[derive(Debug)]
pub struct MemoryStore {
    max_per_source: usize,
    max_sources: usize,
    sources: RwLock<HashMap<String, SourceBucket>>,
}

impl MemoryStore {
    pub fn new(max_per_source: usize, max_sources: usize) -> Self {
        Self {
            max_per_source,
            max_sources,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Accept an envelope. Evicts the source's oldest envelope when the
    /// per-source cap is reached; refuses envelopes from new sources once
    /// the source bound is hit.
    pub fn put(&self, envelope: Envelope) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());

        if !sources.contains_key(&envelope.source_id) && sources.len() >= self.max_sources {
            debug!(
                "source bound reached ({}), rejecting envelope from {}",
                self.max_sources, envelope.source_id
            );
            return;
        }

        let bucket = sources.entry(envelope.source_id.clone()).or_default();
        let key = (envelope.timestamp, bucket.seq);
        bucket.seq += 1;
        bucket.envelopes.insert(key, envelope);

        while bucket.envelopes.len() > self.max_per_source {
            bucket.envelopes.pop_first();
            bucket.expired += 1;
        }
    }
}

impl StoreReader for MemoryStore {
    #[allow(clippy::too_many_arguments)]
    fn get(
        &self,
        source_id: &str,
        start: i64,
        end: i64,
        envelope_types: Option<&[EnvelopeType]>,
        name_filter: Option<&Regex>,
        limit: usize,
        descending: bool,
    ) -> Vec<Envelope> {
        // An inverted window can reach here when the caller defaults the end
        // to "now" but asks for a future start.
        if start >= end {
            return Vec::new();
        }

        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        let Some(bucket) = sources.get(source_id) else {
            return Vec::new();
        };

        let matches = |env: &Envelope| {
            if let Some(types) = envelope_types {
                if !types.contains(&env.envelope_type()) {
                    return false;
                }
            }
            if let Some(re) = name_filter {
                return env.names().iter().any(|n| re.is_match(n));
            }
            true
        };

        let window = bucket.envelopes.range((start, u64::MIN)..(end, u64::MIN));
        if descending {
            window
                .rev()
                .map(|(_, env)| env)
                .filter(|env| matches(env))
                .take(limit)
                .cloned()
                .collect()
        } else {
            window
                .map(|(_, env)| env)
                .filter(|env| matches(env))
                .take(limit)
                .cloned()
                .collect()
        }
    }

    fn meta(&self) -> HashMap<String, MetaInfo> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources
            .iter()
            .map(|(source_id, bucket)| {
                let oldest = bucket.envelopes.keys().next().map(|(ts, _)| *ts);
                let newest = bucket.envelopes.keys().next_back().map(|(ts, _)| *ts);
                (
                    source_id.clone(),
                    MetaInfo {
                        count: bucket.envelopes.len() as u64,
                        expired: bucket.expired,
                        oldest_timestamp: oldest.unwrap_or(0),
                        newest_timestamp: newest.unwrap_or(0),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogStream, Payload};
    use std::collections::HashMap as Map;

    fn log(source_id: &str, timestamp: i64) -> Envelope {
        Envelope {
            timestamp,
            source_id: source_id.into(),
            instance_id: "0".into(),
            tags: Map::new(),
            payload: Payload::Log {
                payload: b"line".to_vec(),
                stream: LogStream::Stdout,
            },
        }
    }

    fn counter(source_id: &str, timestamp: i64, name: &str) -> Envelope {
        Envelope {
            timestamp,
            source_id: source_id.into(),
            instance_id: "0".into(),
            tags: Map::new(),
            payload: Payload::Counter {
                name: name.into(),
                delta: 1,
                total: 1,
            },
        }
    }

    #[test]
    fn get_honors_the_time_window() {
        let store = MemoryStore::new(100, 100);
        for ts in 1..=5 {
            store.put(log("a", ts));
        }

        // End is exclusive.
        let got = store.get("a", 2, 4, None, None, 100, false);
        let timestamps: Vec<i64> = got.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![2, 3]);
    }

    #[test]
    fn get_descending_reverses_order() {
        let store = MemoryStore::new(100, 100);
        for ts in 1..=3 {
            store.put(log("a", ts));
        }

        let got = store.get("a", 0, 10, None, None, 100, true);
        let timestamps: Vec<i64> = got.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![3, 2, 1]);
    }

    #[test]
    fn get_applies_limit_after_filters() {
        let store = MemoryStore::new(100, 100);
        for ts in 1..=10 {
            store.put(log("a", ts));
            store.put(counter("a", ts, "requests"));
        }

        let got = store.get(
            "a",
            0,
            100,
            Some(&[EnvelopeType::Counter]),
            None,
            3,
            false,
        );
        assert_eq!(got.len(), 3);
        assert!(
            got.iter()
                .all(|e| e.envelope_type() == EnvelopeType::Counter)
        );
    }

    #[test]
    fn get_matches_metric_names_against_the_filter() {
        let store = MemoryStore::new(100, 100);
        store.put(counter("a", 1, "http.requests"));
        store.put(counter("a", 2, "memory.used"));
        store.put(log("a", 3));

        let re = Regex::new(".*requests.*").unwrap();
        let got = store.get("a", 0, 10, None, Some(&re), 100, false);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].timestamp, 1);
    }

    #[test]
    fn unknown_source_reads_empty() {
        let store = MemoryStore::new(100, 100);
        assert!(store.get("missing", 0, 10, None, None, 100, false).is_empty());
    }

    #[test]
    fn per_source_cap_evicts_oldest_and_counts_expired() {
        let store = MemoryStore::new(3, 100);
        for ts in 1..=5 {
            store.put(log("a", ts));
        }

        let got = store.get("a", 0, 100, None, None, 100, false);
        let timestamps: Vec<i64> = got.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4, 5]);

        let meta = store.meta();
        let info = meta.get("a").unwrap();
        assert_eq!(info.count, 3);
        assert_eq!(info.expired, 2);
        assert_eq!(info.oldest_timestamp, 3);
        assert_eq!(info.newest_timestamp, 5);
    }

    #[test]
    fn source_bound_rejects_new_sources_only() {
        let store = MemoryStore::new(10, 2);
        store.put(log("a", 1));
        store.put(log("b", 1));
        store.put(log("c", 1));
        store.put(log("a", 2));

        let meta = store.meta();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get("a").unwrap().count, 2);
        assert!(!meta.contains_key("c"));
    }

    #[test]
    fn same_timestamp_envelopes_are_all_kept() {
        let store = MemoryStore::new(100, 100);
        store.put(counter("a", 5, "first"));
        store.put(counter("a", 5, "second"));

        let got = store.get("a", 5, 6, None, None, 100, false);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].names(), vec!["first"]);
        assert_eq!(got[1].names(), vec!["second"]);
    }
}
