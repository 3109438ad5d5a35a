//! The TCP wire transport.
//!
//! The broker's accept loop and per-connection dispatch live in
//! [`crate::broker`]; this module only owns the length-prefixed codec
//! those tasks read and write through.

pub mod framing;
