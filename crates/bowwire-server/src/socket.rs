//! TCP listener and per-connection sessions.
//!
//! Conversation with a peer, all in frames:
//!
//! 1. The peer sends the channel it subscribes to (`/null` for none).
//! 2. It then sends any number of pairs: a channel name, then the data to
//!    publish on it.
//!
//! Messages for the peer's own subscription are written to it by a
//! dedicated writer task, so each stream has one reader and one writer.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{Instrument, debug, error, info, info_span, warn};

use bowwire_core::Channel;
use bowwire_protocol::{ProtocolError, read_message_limited, send_message};

use crate::broker::{SharedBroker, SharedPayload, new_shared_broker};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// The broker's TCP server.
pub struct BrokerServer {
    config: ServerConfig,
    listener: TcpListener,
    broker: SharedBroker,
    connection_semaphore: Arc<Semaphore>,
}

impl BrokerServer {
    /// Binds the listen address from the configuration.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| ServerError::bind(config.bind_addr, e))?;
        info!(addr = %listener.local_addr()?, "Broker listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Self {
            config,
            listener,
            broker: new_shared_broker(),
            connection_semaphore,
        })
    }

    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the channel registry.
    pub fn broker(&self) -> SharedBroker {
        self.broker.clone()
    }

    /// Accepts a single connection, waiting for a free connection slot first.
    pub async fn accept(&self) -> ServerResult<Session> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| std::io::Error::other("connection semaphore closed"))?;

        let (stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "Accepted connection");

        Ok(Session {
            stream,
            peer,
            broker: self.broker.clone(),
            config: self.config.clone(),
            _permit: permit,
        })
    }

    /// Runs the accept loop, one task per connection.
    pub async fn run(&self) -> ServerResult<()> {
        loop {
            match self.accept().await {
                Ok(session) => {
                    let span = info_span!("session", peer = %session.peer);
                    tokio::spawn(
                        async move {
                            match session.run().await {
                                Ok(()) => info!("Peer closed"),
                                Err(e) if e.is_disconnect() => info!(error = %e, "Peer disconnected"),
                                Err(e) => warn!(error = %e, "Session failed"),
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Sessions already running are not interrupted.
    pub async fn run_until_shutdown<S>(&self, shutdown: S) -> ServerResult<()>
    where
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// One peer connection.
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    broker: SharedBroker,
    config: ServerConfig,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    /// Returns the peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serves the connection until the peer leaves or breaks the protocol.
    ///
    /// A peer that closes the stream between frames ends the session with
    /// `Ok(())`.
    pub async fn run(self) -> ServerResult<()> {
        let Session {
            stream,
            peer,
            broker,
            config,
            _permit,
        } = self;
        let (mut reader, writer) = stream.into_split();

        let handshake = tokio::time::timeout(
            config.handshake_timeout,
            read_message_limited(&mut reader, config.max_frame_len),
        )
        .await
        .map_err(|_| ServerError::HandshakeTimeout { peer })?;

        let subscription = match handshake {
            Ok(bytes) => Channel::from_bytes(&bytes)?,
            Err(e) if e.is_clean_close() => {
                debug!("Peer left before subscribing");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        info!(channel = %subscription, "Peer subscribed");

        let (tx, rx) = mpsc::channel(config.subscriber_queue);
        let id = broker.subscribe(subscription.clone(), peer, tx).await;
        let writer_task = tokio::spawn(write_loop(writer, rx).in_current_span());

        let result = read_loop(&mut reader, &broker, config.max_frame_len).await;

        broker.unsubscribe(&subscription, id).await;
        writer_task.abort();
        result
    }
}

/// Reads (channel, data) pairs and routes them until the peer closes.
async fn read_loop(
    reader: &mut OwnedReadHalf,
    broker: &SharedBroker,
    max_frame_len: u32,
) -> ServerResult<()> {
    loop {
        let channel = match read_message_limited(reader, max_frame_len).await {
            Ok(bytes) if bytes.is_empty() => {
                debug!("Empty channel frame, ending session");
                return Ok(());
            }
            Ok(bytes) => Channel::from_bytes(&bytes)?,
            Err(e) if e.is_clean_close() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let data = read_message_limited(reader, max_frame_len).await?;

        let preview = &data[..data.len().min(19)];
        debug!(channel = %channel, len = data.len(), preview = ?preview, "Publishing");

        let delivered = broker.route(&channel, SharedPayload::from(data)).await;
        debug!(channel = %channel, delivered, "Routed");
    }
}

/// Writes queued payloads to the peer until the queue closes or a write fails.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<SharedPayload>) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = send_message(&mut writer, &payload).await {
            match e {
                ProtocolError::TransportClosed { .. } => debug!(error = %e, "Subscriber gone"),
                _ => warn!(error = %e, "Failed to deliver message"),
            }
            break;
        }
    }
}
