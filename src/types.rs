//! Core data model: envelopes, hash ranges, and RPC message types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wall clock in nanoseconds since the Unix epoch.
///
/// Envelope timestamps and read windows are all expressed in nanoseconds.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// =============================================================================
// ENVELOPES
// =============================================================================

/// Envelope type selector used by read requests.
///
/// `Any` is a wildcard: it is stripped during request validation and never
/// reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeType {
    Any,
    Log,
    Counter,
    Gauge,
    Timer,
    Event,
}

/// Stream a log line was emitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A single gauge measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeValue {
    pub unit: String,
    pub value: f64,
}

/// The typed payload of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Log {
        payload: Vec<u8>,
        stream: LogStream,
    },
    Counter {
        name: String,
        delta: u64,
        total: u64,
    },
    Gauge {
        metrics: HashMap<String, GaugeValue>,
    },
    Timer {
        name: String,
        start: i64,
        stop: i64,
    },
    Event {
        title: String,
        body: String,
    },
}

/// A single telemetry record.
///
/// Envelopes are immutable once accepted. The routing fabric never inspects
/// the payload; it routes by `source_id` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Logical producer of the envelope (typically an application GUID).
    pub source_id: String,
    /// Producer instance within the source.
    pub instance_id: String,
    pub tags: HashMap<String, String>,
    pub payload: Payload,
}

impl Envelope {
    pub fn envelope_type(&self) -> EnvelopeType {
        match self.payload {
            Payload::Log { .. } => EnvelopeType::Log,
            Payload::Counter { .. } => EnvelopeType::Counter,
            Payload::Gauge { .. } => EnvelopeType::Gauge,
            Payload::Timer { .. } => EnvelopeType::Timer,
            Payload::Event { .. } => EnvelopeType::Event,
        }
    }

    /// Metric name the read-path name filter matches against.
    ///
    /// Logs have no name; gauges match if any contained metric matches.
    pub fn names(&self) -> Vec<&str> {
        match &self.payload {
            Payload::Log { .. } => Vec::new(),
            Payload::Counter { name, .. } => vec![name.as_str()],
            Payload::Gauge { metrics } => metrics.keys().map(|k| k.as_str()).collect(),
            Payload::Timer { name, .. } => vec![name.as_str()],
            Payload::Event { title, .. } => vec![title.as_str()],
        }
    }
}

// =============================================================================
// HASH RANGES
// =============================================================================

/// An inclusive interval over the 64-bit hash keyspace.
///
/// The unit of ownership in the cluster. Ranges may overlap: every node whose
/// ranges contain a key owns the envelopes hashing to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, key: u64) -> bool {
        self.start <= key && key <= self.end
    }
}

// =============================================================================
// META
// =============================================================================

/// Per-source accounting describing what a store currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Envelopes currently held.
    pub count: u64,
    /// Envelopes evicted since the source was first seen.
    pub expired: u64,
    /// Nanoseconds since the Unix epoch.
    pub oldest_timestamp: i64,
    pub newest_timestamp: i64,
}

// =============================================================================
// RPC MESSAGES
// =============================================================================

/// Ingress write request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Do not re-route; service from this node only. Set by the fabric when
    /// fanning out to prevent forwarding loops.
    pub local_only: bool,
    pub envelopes: Vec<Envelope>,
}

/// Time-windowed egress read request.
///
/// `limit` is signed so that out-of-range values can be rejected during
/// validation rather than silently truncated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub source_id: String,
    /// Window start, inclusive, nanoseconds. Zero means "from the beginning".
    pub start_time: i64,
    /// Window end, exclusive, nanoseconds. Zero means "until now".
    pub end_time: i64,
    /// Maximum envelopes returned. Zero means the server default of 100.
    pub limit: i64,
    /// Types to include. Empty (or containing `Any`) means all types.
    pub envelope_types: Vec<EnvelopeType>,
    /// Regular expression applied to metric names. Empty means no filter.
    pub name_filter: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub envelopes: Vec<Envelope>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRequest {
    pub local_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaResponse {
    pub meta: HashMap<String, MetaInfo>,
}

/// Authoritative range assignment from the scheduler, addressed by node
/// address rather than index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetRangesRequest {
    pub ranges: HashMap<String, Vec<Range>>,
}
