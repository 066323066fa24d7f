//! TCP client for the bowwire broker.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use bowwire_core::Channel;
use bowwire_protocol::{Record, Validator, decode, encode, read_message, send_message};

use crate::error::{ClientError, ClientResult};

/// A connection to the broker, subscribed to one channel.
pub struct BrokerClient {
    stream: TcpStream,
    subscription: Channel,
    id: Uuid,
}

impl BrokerClient {
    /// Connects to `addr` and subscribes to `subscription`.
    ///
    /// Use [`Channel::null`] for a connection that only publishes.
    pub async fn connect(
        addr: &str,
        subscription: Channel,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let id = Uuid::new_v4();
        debug!(addr, client_id = %id, channel = %subscription, "connecting to broker");

        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::Connection(format!(
                    "connection timed out after {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| ClientError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        tokio::time::timeout(timeout, send_message(&mut stream, subscription.as_bytes()))
            .await
            .map_err(|_| ClientError::Timeout("sending subscription".into()))??;

        Ok(Self {
            stream,
            subscription,
            id,
        })
    }

    /// Returns the subscribed channel.
    pub fn subscription(&self) -> &Channel {
        &self.subscription
    }

    /// Returns the identifier used in this client's log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publishes raw data on `channel`.
    pub async fn publish(&mut self, channel: &Channel, data: &[u8]) -> ClientResult<()> {
        send_message(&mut self.stream, channel.as_bytes()).await?;
        send_message(&mut self.stream, data).await?;
        debug!(client_id = %self.id, channel = %channel, len = data.len(), "published");
        Ok(())
    }

    /// Encodes `record` under `validator` and publishes it on `channel`.
    pub async fn publish_record<V>(
        &mut self,
        channel: &Channel,
        record: &Record,
        validator: &V,
    ) -> ClientResult<()>
    where
        V: Validator + ?Sized,
    {
        let payload = encode(record, validator)?;
        self.publish(channel, &payload).await
    }

    /// Waits for the next message on the subscription.
    ///
    /// Returns `None` when the broker closes the connection between messages.
    pub async fn next_message(&mut self) -> ClientResult<Option<Vec<u8>>> {
        match read_message(&mut self.stream).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.is_clean_close() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Waits for the next message and decodes it as a record.
    pub async fn next_record<V>(&mut self, validator: &V) -> ClientResult<Option<Record>>
    where
        V: Validator + ?Sized,
    {
        match self.next_message().await? {
            Some(payload) => Ok(Some(decode(&payload, validator)?)),
            None => Ok(None),
        }
    }

    /// Closes the connection.
    pub async fn close(mut self) -> ClientResult<()> {
        use tokio::io::AsyncWriteExt;

        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bowwire_protocol::{AcceptAll, GrammarRules, ProtocolError};
    use bowwire_server::{BrokerServer, ServerConfig};
    use serde_json::json;

    async fn start_broker() -> (String, bowwire_server::SharedBroker) {
        let server = BrokerServer::bind(ServerConfig::new("127.0.0.1:0".parse().unwrap()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let broker = server.broker();
        tokio::spawn(async move { server.run().await });
        (addr, broker)
    }

    async fn wait_subscribed(broker: &bowwire_server::SharedBroker, channel: &Channel) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.subscriber_count(channel).await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let (addr, broker) = start_broker().await;
        let topic = Channel::new("saskan_concept").unwrap();

        let mut subscriber = BrokerClient::connect(&addr, topic.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        wait_subscribed(&broker, &topic).await;

        let mut publisher = BrokerClient::connect(&addr, Channel::null(), Duration::from_secs(5))
            .await
            .unwrap();
        publisher.publish(&topic, b"hello").await.unwrap();

        assert_eq!(subscriber.next_message().await.unwrap().unwrap(), b"hello");
        assert_ne!(subscriber.id(), publisher.id());
    }

    #[tokio::test]
    async fn records_round_trip_through_broker() {
        let (addr, broker) = start_broker().await;
        let queue = Channel::new("/queue/redis_io_services").unwrap();
        let rules = GrammarRules::default().require("seq");

        let mut worker = BrokerClient::connect(&addr, queue.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        wait_subscribed(&broker, &queue).await;

        let mut publisher = BrokerClient::connect(&addr, Channel::null(), Duration::from_secs(5))
            .await
            .unwrap();
        let record: Record = serde_json::from_value(json!({"seq": 7, "op": "get"})).unwrap();
        publisher.publish_record(&queue, &record, &rules).await.unwrap();

        let received = worker.next_record(&rules).await.unwrap().unwrap();
        assert_eq!(received, record);
    }

    #[tokio::test]
    async fn invalid_record_is_not_sent() {
        let (addr, _broker) = start_broker().await;
        let mut publisher = BrokerClient::connect(&addr, Channel::null(), Duration::from_secs(5))
            .await
            .unwrap();

        let record = Record::new();
        let rules = GrammarRules::default().require("seq");
        let err = publisher
            .publish_record(&Channel::new("x").unwrap(), &record, &rules)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::GrammarViolation(_))
        ));
    }

    #[tokio::test]
    async fn next_message_none_on_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_message(&mut stream).await;
        });

        let mut client = BrokerClient::connect(&addr, Channel::null(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(client.next_message().await.unwrap().is_none());
        assert!(client.next_record(&AcceptAll).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = BrokerClient::connect(&addr, Channel::null(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
