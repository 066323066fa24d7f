//! Subscribe command: prints messages arriving on a channel.

use std::io::Write;

use tracing::{debug, info};

use bowwire_core::Channel;
use bowwire_protocol::canonical_text;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::socket::BrokerClient;

/// Options for `bowwire subscribe`.
#[derive(Debug)]
pub struct SubscribeOptions {
    pub channel: String,
    pub records: bool,
    pub count: Option<usize>,
}

/// Subscribes and writes one line per message to stdout.
///
/// Raw messages are printed as (lossy) UTF-8 text, records as canonical JSON.
/// Returns when the broker closes the connection or `count` messages arrived.
pub async fn run(options: SubscribeOptions, config: &ClientConfig) -> ClientResult<()> {
    let channel = Channel::new(options.channel)?;
    let mut client =
        BrokerClient::connect(&config.server.addr, channel, config.server.timeout()).await?;
    info!(channel = %client.subscription(), "Subscribed");

    let stdout = std::io::stdout();
    let mut received = 0usize;
    while options.count.is_none_or(|max| received < max) {
        let line = if options.records {
            match client.next_record(&config.grammar).await? {
                Some(record) => canonical_text(&record)?,
                None => break,
            }
        } else {
            match client.next_message().await? {
                Some(payload) => String::from_utf8_lossy(&payload).into_owned(),
                None => break,
            }
        };

        let mut out = stdout.lock();
        writeln!(out, "{}", line)?;
        out.flush()?;
        received += 1;
    }

    debug!(received, "Subscription ended");
    Ok(())
}
