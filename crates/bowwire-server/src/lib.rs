//! Channel broker.
//!
//! Peers connect over TCP, name one channel to subscribe to, and publish
//! (channel, data) pairs. Plain channels fan out to every subscriber;
//! channels starting with `/queue` hand each message to one subscriber,
//! rotating between them.
//!
//! # Example
//!
//! ```rust,no_run
//! use bowwire_server::{BrokerServer, ServerConfig, Shutdown, listen_for_signals};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = BrokerServer::bind(ServerConfig::default()).await?;
//!
//!     let shutdown = Shutdown::new();
//!     listen_for_signals(shutdown.clone());
//!     server.run_until_shutdown(shutdown.wait()).await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod config;
mod error;
mod signals;
mod socket;

pub use broker::{Broker, SharedBroker, SharedPayload, Subscriber, SubscriberId, new_shared_broker};
pub use config::{DEFAULT_PORT, ServerConfig, default_bind_addr};
pub use error::{ServerError, ServerResult};
pub use signals::{Shutdown, listen_for_signals};
pub use socket::{BrokerServer, Session};
