//! Length-prefixed message framing.
//!
//! Every message is a 4-byte big-endian length prefix followed by exactly
//! that many payload bytes:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  payload         |
//! +----------------+------------------+
//! ```
//!
//! There is no magic number, version or checksum. The payload is opaque.
//!
//! The async functions here work on any tokio `AsyncRead`/`AsyncWrite`.
//! Dropping one of their futures cancels it, but leaves the stream at an
//! unknown position inside a frame: the stream must then be closed. The
//! same holds after a caller-side timeout.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{FrameStage, ProtocolError, ProtocolResult};

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: u32 = u32::MAX;

/// Initial buffer size for payloads; larger payloads grow as bytes arrive.
const INITIAL_PAYLOAD_CAPACITY: usize = 64 * 1024;

/// Returns the length prefix for a payload of `len` bytes.
///
/// Fails with [`ProtocolError::MessageTooLarge`] if `len` does not fit in
/// four bytes.
pub fn length_prefix(len: usize) -> ProtocolResult<[u8; PREFIX_LEN]> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| ProtocolError::MessageTooLarge {
            size: len as u64,
            max: u64::from(MAX_PAYLOAD_LEN),
        })
}

/// Encodes a payload as a complete frame.
///
/// # Example
///
/// ```rust
/// use bowwire_protocol::encode_frame;
///
/// let frame = encode_frame(b"hello").unwrap();
/// assert_eq!(frame, b"\x00\x00\x00\x05hello");
/// ```
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    let prefix = length_prefix(payload.len())?;
    let mut buffer = Vec::with_capacity(PREFIX_LEN + payload.len());
    buffer.extend_from_slice(&prefix);
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

/// Decodes the first frame in `data`.
///
/// Returns the payload and the bytes following the frame.
///
/// # Example
///
/// ```rust
/// use bowwire_protocol::decode_frame;
///
/// let (payload, rest) = decode_frame(b"\x00\x00\x00\x02hi\x00").unwrap();
/// assert_eq!(payload, b"hi");
/// assert_eq!(rest, b"\x00");
/// ```
pub fn decode_frame(data: &[u8]) -> ProtocolResult<(&[u8], &[u8])> {
    let Some((prefix, body)) = data.split_first_chunk::<PREFIX_LEN>() else {
        return Err(ProtocolError::IncompleteRead {
            stage: FrameStage::Prefix,
            expected: PREFIX_LEN,
            received: data.len(),
        });
    };

    let len = u32::from_be_bytes(*prefix) as usize;
    if body.len() < len {
        return Err(ProtocolError::IncompleteRead {
            stage: FrameStage::Payload,
            expected: len,
            received: body.len(),
        });
    }

    Ok(body.split_at(len))
}

/// Reads one message from the stream.
///
/// Suspends until the whole frame has arrived. If the stream ends first,
/// fails with [`ProtocolError::IncompleteRead`]; a short payload is never
/// returned.
pub async fn read_message<R>(stream: &mut R) -> ProtocolResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    read_message_limited(stream, MAX_PAYLOAD_LEN).await
}

/// Reads one message, rejecting frames whose prefix announces more than
/// `max_len` bytes.
///
/// The limit is checked before any payload byte is read, so the stream is
/// left inside the oversized frame and must be discarded.
pub async fn read_message_limited<R>(stream: &mut R, max_len: u32) -> ProtocolResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        match stream.read(&mut prefix[filled..]).await {
            Ok(0) => {
                return Err(ProtocolError::IncompleteRead {
                    stage: FrameStage::Prefix,
                    expected: PREFIX_LEN,
                    received: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(prefix);
    if len > max_len {
        return Err(ProtocolError::MessageTooLarge {
            size: u64::from(len),
            max: u64::from(max_len),
        });
    }

    let expected = len as usize;
    let mut payload = Vec::with_capacity(expected.min(INITIAL_PAYLOAD_CAPACITY));
    let received = stream
        .take(u64::from(len))
        .read_to_end(&mut payload)
        .await?;
    if received < expected {
        return Err(ProtocolError::IncompleteRead {
            stage: FrameStage::Payload,
            expected,
            received,
        });
    }

    trace!(len = expected, "frame read");
    Ok(payload)
}

/// Writes one message to the stream and flushes it.
///
/// Returns once the transport has accepted the bytes. A rejected write
/// fails with [`ProtocolError::TransportClosed`].
///
/// # Example
///
/// ```rust
/// use bowwire_protocol::{read_message, send_message};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (mut client, mut server) = tokio::io::duplex(64);
/// send_message(&mut client, b"hello").await.unwrap();
/// assert_eq!(read_message(&mut server).await.unwrap(), b"hello");
/// # }
/// ```
pub async fn send_message<W>(stream: &mut W, payload: &[u8]) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let prefix = length_prefix(payload.len())?;

    stream
        .write_all(&prefix)
        .await
        .map_err(|e| ProtocolError::transport_closed(FrameStage::Prefix, e))?;
    stream
        .write_all(payload)
        .await
        .map_err(|e| ProtocolError::transport_closed(FrameStage::Payload, e))?;
    stream
        .flush()
        .await
        .map_err(|e| ProtocolError::transport_closed(FrameStage::Flush, e))?;

    trace!(len = payload.len(), "frame sent");
    Ok(())
}
