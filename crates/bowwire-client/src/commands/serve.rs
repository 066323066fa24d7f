//! Serve command: runs the broker in the foreground.

use std::net::SocketAddr;

use tracing::info;

use bowwire_server::{BrokerServer, ServerConfig, Shutdown, listen_for_signals};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Options for `bowwire serve`.
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub bind: Option<SocketAddr>,
    pub max_connections: Option<usize>,
}

/// Builds the broker configuration from flags and the config file.
///
/// `--bind` wins over `[server] addr`.
pub fn server_config(options: &ServeOptions, config: &ClientConfig) -> ClientResult<ServerConfig> {
    let bind_addr = match options.bind {
        Some(addr) => addr,
        None => config.server.addr.parse().map_err(|e| {
            ClientError::Config(format!(
                "[server] addr {:?} is not a socket address: {}",
                config.server.addr, e
            ))
        })?,
    };

    let mut server_config = ServerConfig::new(bind_addr);
    if let Some(max) = options.max_connections {
        server_config = server_config.with_max_connections(max);
    }
    Ok(server_config)
}

/// Runs the broker until SIGINT or SIGTERM.
pub async fn run(options: ServeOptions, config: &ClientConfig) -> ClientResult<()> {
    let server_config = server_config(&options, config)?;
    let server = BrokerServer::bind(server_config).await?;

    let shutdown = Shutdown::new();
    listen_for_signals(shutdown.clone());

    server.run_until_shutdown(shutdown.wait()).await?;

    info!("Broker stopped");
    Ok(())
}
