//! Keepalive/timeout policy and wire-format constants.
//!
//! `TIMEOUT` is computed from `KEEPALIVE_TIMEOUT` and `OPS_TIMEOUT` rather
//! than hand-entered, so the `TIMEOUT >= KEEPALIVE_TIMEOUT + OPS_TIMEOUT`
//! relationship holds by construction.

use std::time::Duration;

/// Idle period after which a sender must emit an empty keepalive frame.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Time budget a sender has for useful work before it must yield.
pub const OPS_TIMEOUT: Duration = Duration::from_secs(10);

/// Receive-side deadline for a framed message (header + payload combined).
pub const TIMEOUT: Duration =
    Duration::from_secs(KEEPALIVE_TIMEOUT.as_secs() + OPS_TIMEOUT.as_secs() + 1);

/// Per-operation deadline during negotiation.
pub const NEGOTIATION_TIMEOUT: Duration = TIMEOUT;

/// Deadline a sink has to complete a single send of a dequeued payload.
pub const SINK_SEND_TIMEOUT: Duration = Duration::from_millis(OPS_TIMEOUT.as_millis() as u64 / 4);

/// Capacity of each sink's queue.
pub const QUEUE_SIZE: usize = 5;

/// Header size in bytes: an 8-byte little-endian payload length.
pub const HEADER_MSG_LEN: usize = 8;

/// Default maximum payload length `receive` will allocate for.
///
/// `HEADER_MSG_LEN = 8` supports declared lengths up to 2^64-1; this caps
/// the allocation a peer can force so a bogus header can't exhaust memory.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Default TCP port the broker listens on.
pub const DEFAULT_PORT: u16 = 30000;
