//! Wire-protocol constants.
//!
//! Every frame and collection crossing a node boundary is bounded; a peer
//! cannot make this node allocate more than the limits below allow.

/// Protocol version number. Increment on breaking wire format changes.
/// Nodes with a different version are rejected during the preamble exchange.
pub const PROTOCOL_VERSION: u32 = 1;

/// Magic bytes identifying cache-fabric packets. Prevents cross-talk with
/// unrelated services on the same port.
pub const PROTOCOL_MAGIC: [u8; 4] = *b"LGCH";

/// Default TCP port a node listens on.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum size of any frame on the wire (8 MB).
///
/// Must fit the largest legitimate message: a full meta response for
/// `MAX_META_SOURCES` sources at roughly 60 bytes each.
pub const MESSAGE_SIZE_LIMIT: usize = 8 * 1024 * 1024;

/// Dial timeout for peer connections.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// How long the server waits for a client's preamble before hanging up.
/// Keeps idle port-scanners from holding accept slots open.
pub const PREAMBLE_TIMEOUT_SECS: u64 = 10;
