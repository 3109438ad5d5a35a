//! Error taxonomy for the broker's internals.
//!
//! The binary entry point uses `anyhow::Result` for top-level reporting;
//! within the library, call sites match on specific [`Error`] variants
//! (a dropped sink is not the same failure as a malformed header).

use std::io;

/// Errors produced by the framed transport, negotiation, and dataset
/// pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer sent a header or payload that didn't parse as a valid frame.
    #[error("malformed frame on the wire")]
    Framing,

    /// No frame arrived within the expected deadline.
    #[error("timed out waiting for a frame")]
    Timeout,

    /// The peer violated the negotiation or dataset protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The broker was asked to shut down while this task was running.
    #[error("cancelled")]
    Cancelled,

    /// The listener could not bind to its configured address.
    #[error("failed to bind listener: {0}")]
    BindFailure(#[source] io::Error),

    /// Any other I/O failure (connection reset, broken pipe, ...).
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the broker's internals.
pub type Result<T> = std::result::Result<T, Error>;
