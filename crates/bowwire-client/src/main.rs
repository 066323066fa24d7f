//! bowwire CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use bowwire_client::cli::{Cli, Command, ConfigAction};
use bowwire_client::commands::{
    self, publish::PublishOptions, serve::ServeOptions, subscribe::SubscribeOptions,
};
use bowwire_client::config::ClientConfig;
use bowwire_client::error::{ClientError, ClientResult};
use bowwire_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let debug = cli.debug || config.debug;
    let tracing_config = match &cli.command {
        Command::Serve { json_logs, .. } => {
            let base = TracingConfig::broker();
            let base = if debug {
                base.with_level(tracing::Level::DEBUG)
            } else {
                base
            };
            if *json_logs {
                base.with_format(TracingOutputFormat::Json)
            } else {
                base
            }
        }
        _ => TracingConfig::cli(debug),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Loads the config file and applies command-line overrides.
fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config)?,
        None => ClientConfig::load().map_err(ClientError::Config)?,
    };

    if let Some(ref addr) = cli.addr {
        config.server.addr = addr.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.server.timeout = timeout;
    }
    Ok(config)
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);

    match cli.command {
        Command::Serve {
            bind,
            max_connections,
            ..
        } => {
            commands::serve::run(
                ServeOptions {
                    bind,
                    max_connections,
                },
                &config,
            )
            .await
        }
        Command::Subscribe {
            channel,
            records,
            count,
        } => {
            commands::subscribe::run(
                SubscribeOptions {
                    channel,
                    records,
                    count,
                },
                &config,
            )
            .await
        }
        Command::Publish {
            channel,
            data,
            record,
        } => {
            commands::publish::run(
                PublishOptions {
                    channel,
                    data,
                    record,
                },
                &config,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
