//! Client error types.

use std::fmt;

use bowwire_core::ChannelError;
use bowwire_protocol::ProtocolError;
use bowwire_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to the broker failed.
    Connection(String),
    /// Framing or record encoding error.
    Protocol(ProtocolError),
    /// Invalid channel name.
    Channel(ChannelError),
    /// Operation timed out.
    Timeout(String),
    /// Bad command-line input.
    Input(String),
    /// The broker failed.
    Server(ServerError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::Channel(err) => write!(f, "invalid channel: {}", err),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
            Self::Input(msg) => write!(f, "invalid input: {}", msg),
            Self::Server(err) => write!(f, "broker error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Channel(err) => Some(err),
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<ChannelError> for ClientError {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}
