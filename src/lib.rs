//! `dataserv`: a publish-subscribe data broker.
//!
//! One named source feeds opaque payloads into a dataset; any number of
//! sinks receive every payload fanned out to them, with a bounded
//! per-sink queue that drops the oldest entries if a sink falls behind.

pub mod broker;
pub mod config;
pub mod constants;
pub mod error;
pub mod socket;

pub use broker::Broker;
pub use config::Args;
pub use error::{Error, Result};
