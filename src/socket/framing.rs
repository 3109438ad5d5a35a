//! Length-prefixed wire codec.
//!
//! Every message is `HEADER || PAYLOAD`, where `HEADER` is an 8-byte
//! little-endian unsigned integer giving the length of `PAYLOAD` in bytes.
//! `PAYLOAD` may be empty; a zero-length payload is a keepalive and carries
//! no further meaning at this layer.
//!
//! `receive`/`send` are free functions generic over the read/write half of
//! a split stream, so the same code drives a `TcpStream`'s
//! `OwnedReadHalf`/`OwnedWriteHalf` and an in-memory duplex pipe in tests.

use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::constants::{HEADER_MSG_LEN, MAX_PAYLOAD_LEN};
use crate::error::{Error, Result};

/// Read one framed message, enforcing `deadline` across the header and
/// payload reads combined.
///
/// Returns `Error::Timeout` if `deadline` elapses before the frame is fully
/// read, `Error::Framing` if the peer closes mid-frame, and
/// `Error::Protocol` if the declared payload length exceeds `max_payload`.
pub async fn receive<R>(reader: &mut R, deadline: Duration, max_payload: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    timeout(deadline, receive_inner(reader, max_payload))
        .await
        .map_err(|_| Error::Timeout)?
}

async fn receive_inner<R>(reader: &mut R, max_payload: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_MSG_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|_| Error::Framing)?;
    let len = u64::from_le_bytes(header);

    let len: usize = len
        .try_into()
        .map_err(|_| Error::Protocol(format!("declared payload length {len} overflows usize")))?;
    if len > max_payload {
        return Err(Error::Protocol(format!(
            "declared payload length {len} exceeds maximum {max_payload}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| Error::Framing)?;
    Ok(Bytes::from(payload))
}

/// Write one framed message, enforcing `deadline` across the header and
/// payload writes combined. Callers must ensure a single writer per socket;
/// this function does not lock.
pub async fn send<W>(writer: &mut W, payload: &[u8], deadline: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout(deadline, send_inner(writer, payload))
        .await
        .map_err(|_| Error::Timeout)?
}

async fn send_inner<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = (payload.len() as u64).to_le_bytes();
    writer.write_all(&header).await.map_err(|_| Error::Framing)?;
    writer.write_all(payload).await.map_err(|_| Error::Framing)?;
    writer.flush().await.map_err(|_| Error::Framing)?;
    Ok(())
}
