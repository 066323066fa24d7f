//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// bowwire - framed channel broker and client
#[derive(Debug, Parser)]
#[command(name = "bowwire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "BOWWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Broker address (overrides the config file)
    #[arg(long, env = "BOWWIRE_ADDR")]
    pub addr: Option<String>,

    /// Connection timeout in seconds (overrides the config file)
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the broker in the foreground
    Serve {
        /// Address to listen on
        #[arg(long, short)]
        bind: Option<SocketAddr>,

        /// Maximum concurrent connections
        #[arg(long)]
        max_connections: Option<usize>,

        /// Write JSON logs
        #[arg(long)]
        json_logs: bool,
    },

    /// Subscribe to a channel and print what arrives
    Subscribe {
        /// Channel to subscribe to
        channel: String,

        /// Decode each message as a record and print it as a JSON line
        #[arg(long, short)]
        records: bool,

        /// Exit after this many messages
        #[arg(long, short = 'n')]
        count: Option<usize>,
    },

    /// Publish one message on a channel
    Publish {
        /// Channel to publish on
        channel: String,

        /// Message text, or a JSON object with --record
        data: String,

        /// Encode DATA as a record under the configured grammar
        #[arg(long, short)]
        record: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
