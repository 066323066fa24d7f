//! Thread-blocking framing over `std::io`.
//!
//! Same wire format and error contract as the async functions in
//! [`crate::framing`], for callers that own a plain `Read`/`Write` stream
//! such as a `std::net::TcpStream`.

use std::io::{self, Read, Write};

use tracing::trace;

use crate::error::{FrameStage, ProtocolError, ProtocolResult};
use crate::framing::{MAX_PAYLOAD_LEN, PREFIX_LEN, length_prefix};

/// Reads one message, blocking until the whole frame has arrived.
pub fn read_message<R: Read + ?Sized>(stream: &mut R) -> ProtocolResult<Vec<u8>> {
    read_message_limited(stream, MAX_PAYLOAD_LEN)
}

/// Reads one message, rejecting frames announced as larger than `max_len`.
pub fn read_message_limited<R: Read + ?Sized>(
    stream: &mut R,
    max_len: u32,
) -> ProtocolResult<Vec<u8>> {
    let mut prefix = [0u8; PREFIX_LEN];
    let mut filled = 0;
    while filled < PREFIX_LEN {
        match stream.read(&mut prefix[filled..]) {
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
    let mut payload = Vec::new();
    let received = stream.take(u64::from(len)).read_to_end(&mut payload)?;
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

/// Writes one message and flushes the stream.
pub fn send_message<W: Write + ?Sized>(stream: &mut W, payload: &[u8]) -> ProtocolResult<()> {
    let prefix = length_prefix(payload.len())?;

    stream
        .write_all(&prefix)
        .map_err(|e| ProtocolError::transport_closed(FrameStage::Prefix, e))?;
    stream
        .write_all(payload)
        .map_err(|e| ProtocolError::transport_closed(FrameStage::Payload, e))?;
    stream
        .flush()
        .map_err(|e| ProtocolError::transport_closed(FrameStage::Flush, e))?;

    trace!(len = payload.len(), "frame sent");
    Ok(())
}

/// Reads framed messages from a byte stream.
pub struct FrameReader<R> {
    reader: R,
    max_len: u32,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_len: MAX_PAYLOAD_LEN,
        }
    }

    /// Builder: reject frames larger than `max_len` bytes.
    pub fn with_max_len(mut self, max_len: u32) -> Self {
        self.max_len = max_len;
        self
    }

    /// Reads the next message.
    ///
    /// Returns `Ok(None)` when the stream ends on a frame boundary; a stream
    /// that ends inside a frame is an error.
    pub fn next_message(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        match read_message_limited(&mut self.reader, self.max_len) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.is_clean_close() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = ProtocolResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

/// Writes framed messages to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes and flushes a single message.
    pub fn write_message(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        send_message(&mut self.writer, payload)
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
