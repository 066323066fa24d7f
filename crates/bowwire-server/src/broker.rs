//! Subscriber registry and message routing.
//!
//! Every connected peer subscribes to exactly one channel. A message
//! published on a channel goes to all of its subscribers, except on
//! `/queue*` channels where subscribers take turns and each message reaches
//! only one of them.
//!
//! Subscribers are reached through a bounded mpsc sender; the receiving end
//! is owned by the connection's writer task, which is the only code that
//! writes to that stream.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use bowwire_core::Channel;

/// A payload shared between all subscribers it is delivered to.
pub type SharedPayload = Arc<[u8]>;

/// Identifier assigned to each subscription.
pub type SubscriberId = u64;

/// A subscribed peer.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub peer: SocketAddr,
    tx: mpsc::Sender<SharedPayload>,
}

/// Channel registry shared by all connections.
#[derive(Debug, Default)]
pub struct Broker {
    channels: RwLock<HashMap<Channel, VecDeque<Subscriber>>>,
    next_id: AtomicU64,
}

/// Shared handle to the broker.
pub type SharedBroker = Arc<Broker>;

/// Creates a new shared broker.
pub fn new_shared_broker() -> SharedBroker {
    Arc::new(Broker::default())
}

impl Broker {
    /// Registers a subscriber on `channel` and returns its id.
    pub async fn subscribe(
        &self,
        channel: Channel,
        peer: SocketAddr,
        tx: mpsc::Sender<SharedPayload>,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.channels.write().await;
        channels
            .entry(channel)
            .or_default()
            .push_back(Subscriber { id, peer, tx });
        id
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, channel: &Channel, id: SubscriberId) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Returns the number of subscribers on a channel.
    pub async fn subscriber_count(&self, channel: &Channel) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, VecDeque::len)
    }

    /// Returns the channels that currently have subscribers.
    pub async fn channels(&self) -> Vec<Channel> {
        let mut names: Vec<Channel> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Picks the subscribers a message on `channel` goes to.
    ///
    /// Queue channels rotate so the next call picks a different subscriber.
    async fn targets(&self, channel: &Channel) -> Vec<Subscriber> {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(channel) else {
            return Vec::new();
        };

        if channel.is_queue() {
            subscribers.rotate_right(1);
            subscribers.front().cloned().into_iter().collect()
        } else {
            subscribers.iter().cloned().collect()
        }
    }

    /// Delivers a payload to the subscribers of `channel`.
    ///
    /// Waits until every target has queued the payload; a slow subscriber
    /// therefore slows the publisher. Returns how many subscribers accepted
    /// it. Subscribers whose connection is gone are skipped.
    pub async fn route(&self, channel: &Channel, payload: SharedPayload) -> usize {
        let targets = self.targets(channel).await;
        if targets.is_empty() {
            debug!(channel = %channel, "no subscribers");
            return 0;
        }

        let sends = targets.iter().map(|subscriber| {
            let payload = payload.clone();
            async move {
                match subscriber.tx.send(payload).await {
                    Ok(()) => true,
                    Err(_) => {
                        debug!(
                            id = subscriber.id,
                            peer = %subscriber.peer,
                            "subscriber gone, skipping"
                        );
                        false
                    }
                }
            }
        });

        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn channel(name: &str) -> Channel {
        Channel::new(name).unwrap()
    }

    fn payload(data: &[u8]) -> SharedPayload {
        Arc::from(data)
    }

    #[tokio::test]
    async fn fan_out_to_all_subscribers() {
        let broker = Broker::default();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        broker.subscribe(channel("saskan_concept"), peer(1), tx1).await;
        broker.subscribe(channel("saskan_concept"), peer(2), tx2).await;

        let delivered = broker
            .route(&channel("saskan_concept"), payload(b"hello"))
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(&*rx1.recv().await.unwrap(), b"hello");
        assert_eq!(&*rx2.recv().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn queue_rotates_between_workers() {
        let broker = Broker::default();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let queue = channel("/queue/redis_io_services");
        broker.subscribe(queue.clone(), peer(1), tx1).await;
        broker.subscribe(queue.clone(), peer(2), tx2).await;

        for data in [&b"one"[..], &b"two"[..], &b"three"[..], &b"four"[..]] {
            assert_eq!(broker.route(&queue, payload(data)).await, 1);
        }

        let mut first = Vec::new();
        while let Ok(p) = rx1.try_recv() {
            first.push(p.to_vec());
        }
        let mut second = Vec::new();
        while let Ok(p) = rx2.try_recv() {
            second.push(p.to_vec());
        }

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        // Rotation moves the last subscriber to the front before picking.
        assert_eq!(second, vec![b"one".to_vec(), b"three".to_vec()]);
        assert_eq!(first, vec![b"two".to_vec(), b"four".to_vec()]);
    }

    #[tokio::test]
    async fn no_subscribers() {
        let broker = Broker::default();
        assert_eq!(broker.route(&channel("/queue/x"), payload(b"x")).await, 0);
        assert_eq!(broker.route(&channel("topic"), payload(b"x")).await, 0);
    }

    #[tokio::test]
    async fn other_channels_not_reached() {
        let broker = Broker::default();
        let (tx, mut rx) = mpsc::channel(4);
        broker.subscribe(channel("a"), peer(1), tx).await;

        assert_eq!(broker.route(&channel("b"), payload(b"x")).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_empty_channel() {
        let broker = Broker::default();
        let (tx, _rx) = mpsc::channel(4);
        let id = broker.subscribe(channel("a"), peer(1), tx).await;
        assert_eq!(broker.subscriber_count(&channel("a")).await, 1);
        assert_eq!(broker.channels().await, vec![channel("a")]);

        broker.unsubscribe(&channel("a"), id).await;
        assert_eq!(broker.subscriber_count(&channel("a")).await, 0);
        assert!(broker.channels().await.is_empty());

        // Unknown ids are ignored
        broker.unsubscribe(&channel("a"), id).await;
    }

    #[tokio::test]
    async fn dropped_subscriber_is_skipped() {
        let broker = Broker::default();
        let (tx1, rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        broker.subscribe(channel("a"), peer(1), tx1).await;
        broker.subscribe(channel("a"), peer(2), tx2).await;
        drop(rx1);

        assert_eq!(broker.route(&channel("a"), payload(b"x")).await, 1);
        assert_eq!(&*rx2.recv().await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn subscriber_ids_are_unique() {
        let broker = Broker::default();
        let (tx, _rx) = mpsc::channel(4);
        let a = broker.subscribe(channel("a"), peer(1), tx.clone()).await;
        let b = broker.subscribe(channel("a"), peer(1), tx).await;
        assert_ne!(a, b);
    }
}
