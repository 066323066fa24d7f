//! Publish command: sends one message on a channel.

use bowwire_core::Channel;
use bowwire_protocol::{Record, Value};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::BrokerClient;

/// Options for `bowwire publish`.
#[derive(Debug)]
pub struct PublishOptions {
    pub channel: String,
    pub data: String,
    pub record: bool,
}

/// Parses command-line text into a record.
pub fn parse_record(data: &str) -> ClientResult<Record> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(ClientError::Input(format!(
            "a record must be a JSON object, got {}",
            bowwire_protocol::FieldType::of(&other)
        ))),
        Err(e) => Err(ClientError::Input(format!("not valid JSON: {}", e))),
    }
}

/// Connects without a subscription and publishes one message.
pub async fn run(options: PublishOptions, config: &ClientConfig) -> ClientResult<()> {
    let channel = Channel::new(options.channel)?;
    let record = if options.record {
        Some(parse_record(&options.data)?)
    } else {
        None
    };

    let mut client =
        BrokerClient::connect(&config.server.addr, Channel::null(), config.server.timeout())
            .await?;

    match record {
        Some(record) => {
            client
                .publish_record(&channel, &record, &config.grammar)
                .await?
        }
        None => client.publish(&channel, options.data.as_bytes()).await?,
    }

    client.close().await
}
