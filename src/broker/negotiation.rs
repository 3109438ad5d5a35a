//! Connection negotiation: the first phase of every accepted connection.
//!
//! Reads one role-tagged frame and dispatches into the info reply, the
//! source loop, or the sink loop — all on the same task that accepted the
//! connection, matching the reference implementation's negotiation
//! coroutine staying on the stack for the connection's whole lifetime.
//! Errors here never propagate past this function; every path below ends
//! in a closed connection, logged at the level the error kind calls for.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::broker::dataset::{sink_loop, source_loop};
use crate::broker::protocol::{encode_dataset_list, role};
use crate::broker::queue::SinkQueue;
use crate::broker::Registry;
use crate::constants::{MAX_PAYLOAD_LEN, NEGOTIATION_TIMEOUT};
use crate::socket::framing::{receive, send};

/// Negotiate then run the appropriate steady-state loop for one accepted
/// TCP connection. Returns once the connection is fully closed.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    let role_frame = match receive_during_negotiation(&mut reader, &cancel).await {
        Some(Ok(frame)) => frame,
        Some(Err(err)) => {
            log::debug!("{peer}: negotiation failed reading role tag: {err}");
            return;
        }
        None => {
            log::debug!("{peer}: negotiation cancelled before a role tag arrived");
            return;
        }
    };

    let Some(&tag) = role_frame.first() else {
        log::warn!("{peer}: empty role frame during negotiation");
        return;
    };
    if role_frame.len() != 1 {
        log::warn!("{peer}: role frame carried {} bytes, expected 1", role_frame.len());
        return;
    }

    match tag {
        role::INFO => handle_info(&mut writer, &registry, peer).await,
        role::SOURCE => handle_source(&mut reader, &registry, peer, &cancel).await,
        role::SINK => handle_sink(&mut reader, &mut writer, &registry, peer, &cancel).await,
        other => {
            log::warn!("{peer}: unknown role tag 0x{other:02x}, closing");
        }
    }
}

/// Race a framed `receive` against `cancel`, the way `source_loop`/`sink_loop`
/// already race their steady-state I/O. `None` means `cancel` fired first; a
/// negotiating connection must not keep its task alive in the broker's
/// `JoinSet` for up to `NEGOTIATION_TIMEOUT` after `Broker::stop` is called.
async fn receive_during_negotiation(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    cancel: &CancellationToken,
) -> Option<crate::error::Result<bytes::Bytes>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = receive(reader, NEGOTIATION_TIMEOUT, MAX_PAYLOAD_LEN) => Some(result),
    }
}

async fn read_dataset_name(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    peer: SocketAddr,
    cancel: &CancellationToken,
) -> Option<String> {
    let frame = match receive_during_negotiation(reader, cancel).await {
        Some(Ok(frame)) => frame,
        Some(Err(err)) => {
            log::debug!("{peer}: failed reading dataset name: {err}");
            return None;
        }
        None => {
            log::debug!("{peer}: negotiation cancelled before a dataset name arrived");
            return None;
        }
    };
    match String::from_utf8(frame.to_vec()) {
        Ok(name) => Some(name),
        Err(_) => {
            log::warn!("{peer}: dataset name was not valid UTF-8");
            None
        }
    }
}

async fn handle_info(
    writer: &mut (impl tokio::io::AsyncWrite + Unpin),
    registry: &Registry,
    peer: SocketAddr,
) {
    let names = registry.dataset_names();
    let payload = encode_dataset_list(names);
    if let Err(err) = send(writer, &payload, NEGOTIATION_TIMEOUT).await {
        log::debug!("{peer}: failed to send info reply: {err}");
    }
}

async fn handle_source(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    registry: &Registry,
    peer: SocketAddr,
    cancel: &CancellationToken,
) {
    let Some(name) = read_dataset_name(reader, peer, cancel).await else {
        return;
    };

    let dataset = registry.get_or_create(&name);
    if !dataset.try_claim_source() {
        log::warn!("{peer}: rejected duplicate source for dataset {name:?}");
        return;
    }

    log::info!("{peer}: attached as source of {name:?}");
    source_loop(reader, dataset.as_ref(), cancel).await;
    log::info!("{peer}: source of {name:?} detached");
}

async fn handle_sink(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    writer: &mut (impl tokio::io::AsyncWrite + Unpin),
    registry: &Registry,
    peer: SocketAddr,
    cancel: &CancellationToken,
) {
    let Some(name) = read_dataset_name(reader, peer, cancel).await else {
        return;
    };

    let Some(dataset) = registry.get(&name) else {
        log::warn!("{peer}: rejected sink attach for unknown dataset {name:?}");
        return;
    };

    let queue = Arc::new(SinkQueue::new());
    if let Some(seed) = dataset.latest() {
        queue.enqueue(seed);
    }
    dataset.add_sink(peer, Arc::clone(&queue));

    log::info!("{peer}: attached as sink of {name:?}");
    sink_loop(writer, dataset.as_ref(), peer, &queue, cancel).await;
    log::info!("{peer}: sink of {name:?} detached");
}
