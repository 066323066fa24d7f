//! Broker error types.

use std::io;
use std::net::SocketAddr;

use bowwire_protocol::ProtocolError;
use thiserror::Error;

/// Result type for broker operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the broker.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error on the listener.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing error on a peer connection.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A peer named an invalid channel.
    #[error("Invalid channel: {0}")]
    Channel(#[from] bowwire_core::ChannelError),

    /// Could not bind the listen address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// A peer did not subscribe in time.
    #[error("Peer {peer} sent no subscription within the handshake timeout")]
    HandshakeTimeout { peer: SocketAddr },
}

impl ServerError {
    /// Creates a bind error.
    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }

    /// Returns true if the error only means the peer went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Protocol(
                ProtocolError::IncompleteRead { .. } | ProtocolError::TransportClosed { .. },
            ) => true,
            Self::Protocol(ProtocolError::Io(e)) | Self::Io(e) => is_peer_reset(e),
            _ => false,
        }
    }
}

fn is_peer_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}
