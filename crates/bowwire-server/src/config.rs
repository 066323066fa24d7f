//! Broker configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the broker listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 52000;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,

    /// Time a new peer has to send its subscription frame.
    pub handshake_timeout: Duration,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Largest frame accepted from a peer.
    pub max_frame_len: u32,

    /// Frames buffered per subscriber before publishers wait on it.
    pub subscriber_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            handshake_timeout: Duration::from_secs(30),
            max_connections: 100,
            max_frame_len: 16 * 1024 * 1024,
            subscriber_queue: 64,
        }
    }
}

impl ServerConfig {
    /// Creates a new configuration listening on `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builder: set the subscription handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Builder: set max connections, at least 1.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Builder: set the largest accepted frame.
    pub fn with_max_frame_len(mut self, max: u32) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Builder: set the per-subscriber queue depth.
    pub fn with_subscriber_queue(mut self, depth: usize) -> Self {
        self.subscriber_queue = depth.max(1);
        self
    }
}

/// Returns the default listen address, `127.0.0.1:52000`.
pub fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}
