//! Per-dataset fan-out pipeline: one source reader, N sink writers.
//!
//! A [`Dataset`] is created lazily the first time a source attaches with
//! its name (see [`crate::broker::negotiation`]) and is never removed from
//! the registry afterwards — the name and its `latest` payload stay
//! available to sinks that attach long after the source has gone away.

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::broker::queue::SinkQueue;
use crate::constants::{KEEPALIVE_TIMEOUT, MAX_PAYLOAD_LEN, SINK_SEND_TIMEOUT, TIMEOUT};
use crate::socket::framing::{receive, send};

/// A named fan-out channel: at most one source, any number of sinks.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    latest: Mutex<Option<Bytes>>,
    has_source: Mutex<bool>,
    sinks: Mutex<HashMap<SocketAddr, Arc<SinkQueue>>>,
}

impl Dataset {
    pub fn new(name: String) -> Self {
        Self {
            name,
            latest: Mutex::new(None),
            has_source: Mutex::new(false),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempt to claim the single source slot. Returns `false` (and claims
    /// nothing) if a source is already attached — invariant 1.
    pub fn try_claim_source(&self) -> bool {
        let mut has_source = self.has_source.lock().unwrap_or_else(|e| e.into_inner());
        if *has_source {
            return false;
        }
        *has_source = true;
        true
    }

    /// Release the source slot so a later connection may claim it. Does
    /// not touch `latest` or `sinks` — a dataset outlives its source.
    pub fn release_source(&self) {
        *self.has_source.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    /// Current seed payload for a newly-attaching sink, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Bytes> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_latest(&self, payload: Bytes) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(payload);
    }

    /// Register a new sink attachment, keyed by its peer address
    /// (invariant 2: unique per dataset, enforced by the OS).
    pub fn add_sink(&self, addr: SocketAddr, queue: Arc<SinkQueue>) {
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(addr, queue);
    }

    /// Remove a sink's entry. A sink attachment always removes its own
    /// entry when its task terminates (invariant 5).
    pub fn remove_sink(&self, addr: &SocketAddr) {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner()).remove(addr);
    }

    /// Snapshot the currently-attached sinks' queues. Taken once per
    /// source payload rather than held across the fan-out loop, so a sink
    /// added or removed mid-iteration can't deadlock against the registry
    /// lock (design note 3).
    fn snapshot_sinks(&self) -> Vec<Arc<SinkQueue>> {
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Drive the source side of one dataset attachment until the peer
/// disconnects, times out, or the broker shuts down.
///
/// On exit for any reason, the source slot is released but the dataset
/// itself, its `latest`, and its sinks are left in place.
pub async fn source_loop<R>(reader: &mut R, dataset: &Dataset, cancel: &CancellationToken)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = receive(reader, TIMEOUT, MAX_PAYLOAD_LEN) => result,
        };

        let payload = match frame {
            Ok(payload) => payload,
            Err(err) => {
                log::debug!(
                    "source for dataset {:?} disconnected: {err}",
                    dataset.name()
                );
                break;
            }
        };

        if payload.is_empty() {
            continue;
        }

        dataset.set_latest(payload.clone());
        for queue in dataset.snapshot_sinks() {
            queue.enqueue(payload.clone());
        }
    }

    dataset.release_source();
}

/// Drive the sink side of one dataset attachment until the peer
/// disconnects, a send fails or times out, or the broker shuts down.
///
/// `queue` should already hold the seed payload (if any) before this is
/// called, so the first iteration can deliver `latest` ahead of anything
/// the source sends concurrently.
pub async fn sink_loop<W>(
    writer: &mut W,
    dataset: &Dataset,
    addr: SocketAddr,
    queue: &SinkQueue,
    cancel: &CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = queue.dequeue(KEEPALIVE_TIMEOUT) => item,
        };

        let payload: &[u8] = match &outcome {
            Some(item) => item,
            None => &[],
        };

        if let Err(err) = send(writer, payload, SINK_SEND_TIMEOUT).await {
            log::debug!("sink {addr} on dataset {:?} dropped: {err}", dataset.name());
            break;
        }
    }

    dataset.remove_sink(&addr);
}
