//! Protocol error types.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::grammar::Violation;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// The part of a frame an I/O operation was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    /// The 4-byte length prefix.
    Prefix,
    /// The payload bytes.
    Payload,
    /// Flushing the written frame to the transport.
    Flush,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => f.write_str("length prefix"),
            Self::Payload => f.write_str("payload"),
            Self::Flush => f.write_str("flush"),
        }
    }
}

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream ended before a full frame was received.
    #[error("incomplete read of {stage}: expected {expected} bytes, got {received}")]
    IncompleteRead {
        stage: FrameStage,
        expected: usize,
        received: usize,
    },

    /// The transport rejected a write.
    #[error("transport closed during {stage}: {source}")]
    TransportClosed {
        stage: FrameStage,
        #[source]
        source: io::Error,
    },

    /// Payload does not fit the length prefix, or exceeds the reader's limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u64, max: u64 },

    /// IO error while reading, other than end of stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Record rejected by the grammar before encoding.
    #[error("grammar violation at {0}")]
    GrammarViolation(Violation),

    /// Record could not be converted to its wire form.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Payload could not be decompressed or parsed.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// Payload parsed, but does not satisfy the grammar.
    #[error("malformed data at {0}")]
    MalformedData(Violation),
}

impl ProtocolError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptPayload(message.into())
    }

    pub(crate) fn transport_closed(stage: FrameStage, source: io::Error) -> Self {
        Self::TransportClosed { stage, source }
    }

    /// Returns true if the peer closed the stream on a frame boundary.
    ///
    /// This is an `IncompleteRead` where not a single byte of the next
    /// length prefix arrived; callers usually treat it as an orderly
    /// disconnect rather than a failure.
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            Self::IncompleteRead {
                stage: FrameStage::Prefix,
                received: 0,
                ..
            }
        )
    }

    /// Returns true if the stream can no longer be used for framing.
    pub fn is_fatal_for_stream(&self) -> bool {
        matches!(
            self,
            Self::IncompleteRead { .. }
                | Self::TransportClosed { .. }
                | Self::Io(_)
                | Self::MessageTooLarge { .. }
        )
    }

    /// Returns the offending field path for grammar and parse failures.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::GrammarViolation(v) | Self::MalformedData(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::ViolationKind;

    #[test]
    fn clean_close_only_on_frame_boundary() {
        let clean = ProtocolError::IncompleteRead {
            stage: FrameStage::Prefix,
            expected: 4,
            received: 0,
        };
        assert!(clean.is_clean_close());

        let partial_prefix = ProtocolError::IncompleteRead {
            stage: FrameStage::Prefix,
            expected: 4,
            received: 2,
        };
        assert!(!partial_prefix.is_clean_close());

        let partial_payload = ProtocolError::IncompleteRead {
            stage: FrameStage::Payload,
            expected: 10,
            received: 0,
        };
        assert!(!partial_payload.is_clean_close());
    }

    #[test]
    fn display_names_stage() {
        let err = ProtocolError::IncompleteRead {
            stage: FrameStage::Payload,
            expected: 5,
            received: 3,
        };
        assert_eq!(
            err.to_string(),
            "incomplete read of payload: expected 5 bytes, got 3"
        );

        let err = ProtocolError::transport_closed(
            FrameStage::Prefix,
            io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
        );
        assert_eq!(
            err.to_string(),
            "transport closed during length prefix: broken pipe"
        );
    }

    #[test]
    fn violation_accessor() {
        let err = ProtocolError::GrammarViolation(Violation::new("seq", ViolationKind::Missing));
        assert_eq!(err.violation().map(|v| v.path.as_str()), Some("seq"));
        assert!(!err.is_fatal_for_stream());
        assert!(ProtocolError::corrupt("x").violation().is_none());
    }
}
