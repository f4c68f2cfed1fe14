//! # Message Bus
//!
//! The `MessageBus` trait every role depends on, and the in-process
//! implementation used for single-node runs and tests.

use crate::error::BusError;
use crate::message::BusMessage;
use crate::subject::{validate_publish_subject, SubjectPattern};
use crate::subscriber::{Subscription, SubscriptionGuard};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// A connected bus client.
///
/// Implementations must be cheap to share behind an `Arc`; every role holds
/// one for its whole lifetime.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a message.
    ///
    /// Returns as soon as the transport accepted it. There is no delivery
    /// acknowledgement; a missing subscriber is not an error.
    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;

    /// Publish a request that expects its answer on `reply`.
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.publish(BusMessage::new(subject, payload).with_reply(reply))
            .await
    }

    /// Subscribe to a subject pattern.
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError>;

    /// Flush buffered outbound messages.
    async fn flush(&self) -> Result<(), BusError>;

    /// Flush outbound traffic and close the connection.
    ///
    /// Open subscriptions end; later publishes fail with [`BusError::Closed`].
    async fn drain(&self) -> Result<(), BusError>;

    /// Whether the connection is usable.
    fn is_connected(&self) -> bool;

    /// Total messages accepted for publishing.
    fn messages_published(&self) -> u64;
}

/// In-memory implementation of the bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer fan-out;
/// each subscription filters by its subject pattern. A subscriber that falls
/// more than `capacity` messages behind loses the oldest ones, like a slow
/// consumer on a real broker.
pub struct InMemoryBus {
    /// Broadcast sender for messages.
    sender: broadcast::Sender<BusMessage>,

    /// Flipped to `true` by `drain()`.
    closed: watch::Sender<bool>,

    /// Active subscription count by pattern.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (closed, _) = watch::channel(false);
        Self {
            sender,
            closed,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Another client of the same in-process broker.
    ///
    /// Messages flow between every connection; `drain()` on one closes only
    /// that connection and the subscriptions it created.
    #[must_use]
    pub fn connection(&self) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            sender: self.sender.clone(),
            closed,
            subscriptions: Arc::clone(&self.subscriptions),
            messages_published: AtomicU64::new(0),
            capacity: self.capacity,
        }
    }

    /// Number of live subscriptions across all patterns.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of live subscriptions for one exact pattern.
    #[must_use]
    pub fn subscriptions_for(&self, pattern: &str) -> usize {
        self.subscriptions
            .read()
            .ok()
            .and_then(|subs| subs.get(pattern).copied())
            .unwrap_or(0)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        validate_publish_subject(&message.subject)?;

        self.messages_published.fetch_add(1, Ordering::Relaxed);
        let subject = message.subject.clone();

        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(subject = %subject, receivers, "Message published");
            }
            Err(_) => {
                debug!(subject = %subject, "Message dropped (no subscribers)");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let filter = SubjectPattern::parse(pattern)?;
        let receiver = self.sender.subscribe();
        let mut closed = self.closed.subscribe();

        let stream = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let out = match item {
                    Ok(msg) if filter.matches(&msg.subject) => Some(msg),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(count)) => {
                        warn!(
                            subject = %filter.as_str(),
                            lagged = count,
                            "Subscriber lagged, messages dropped"
                        );
                        None
                    }
                };
                future::ready(out)
            })
            .take_until(async move {
                loop {
                    let is_closed = *closed.borrow_and_update();
                    if is_closed || closed.changed().await.is_err() {
                        break;
                    }
                }
            })
            .boxed();

        debug!(subject = pattern, "New subscription created");

        let guard = SubscriptionGuard::new(self.subscriptions.clone(), pattern.to_string());
        Ok(Subscription::new(pattern, stream, Some(guard)))
    }

    async fn flush(&self) -> Result<(), BusError> {
        // broadcast delivery is synchronous with publish
        Ok(())
    }

    async fn drain(&self) -> Result<(), BusError> {
        self.flush().await?;
        self.closed.send_replace(true);
        info!(
            published = self.messages_published(),
            "In-memory bus drained"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.is_closed()
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryBus::new();

        bus.publish(BusMessage::new("ascii.render", "x")).await.unwrap();
        assert_eq!(bus.messages_published(), 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryBus::new();

        let mut sub1 = bus.subscribe("ascii.*").await.unwrap();
        let mut sub2 = bus.subscribe("ascii.>").await.unwrap();
        let _sub3 = bus.subscribe("img.*").await.unwrap();
        assert_eq!(bus.subscriber_count(), 3);

        bus.publish(BusMessage::new("ascii.render", "x")).await.unwrap();

        let m1 = timeout(Duration::from_millis(100), sub1.recv()).await.unwrap();
        let m2 = timeout(Duration::from_millis(100), sub2.recv()).await.unwrap();
        assert!(m1.is_some());
        assert!(m2.is_some());
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcard_subject() {
        let bus = InMemoryBus::new();
        let result = bus.publish(BusMessage::new("ascii.*", "x")).await;
        assert!(matches!(result, Err(BusError::InvalidSubject { .. })));
    }

    #[tokio::test]
    async fn test_reply_subject_is_carried() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("data.json.*").await.unwrap();

        bus.publish(BusMessage::new("data.json.put", "{}").with_reply("resp.42"))
            .await
            .unwrap();

        let msg = timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.reply.as_deref(), Some("resp.42"));
    }

    #[tokio::test]
    async fn test_drain_closes_subscriptions_and_rejects_publish() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("ascii.*").await.unwrap();

        bus.drain().await.unwrap();

        let next = timeout(Duration::from_millis(100), sub.recv()).await.unwrap();
        assert!(next.is_none());
        assert!(!bus.is_connected());

        let result = bus.publish(BusMessage::new("ascii.render", "x")).await;
        assert_eq!(result, Err(BusError::Closed));
        assert!(matches!(bus.subscribe("ascii.*").await, Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn test_connections_share_broker_but_drain_alone() {
        let hub = InMemoryBus::new();
        let worker = hub.connection();
        let api = hub.connection();

        let mut sub = worker.subscribe("ascii.*").await.unwrap();
        api.publish(BusMessage::new("ascii.render", "x")).await.unwrap();
        let msg = timeout(Duration::from_millis(100), sub.recv()).await.unwrap();
        assert_eq!(msg.unwrap().payload_text(), "x");
        assert_eq!(api.messages_published(), 1);
        assert_eq!(worker.messages_published(), 0);

        api.drain().await.unwrap();
        assert!(!api.is_connected());
        assert!(worker.is_connected());

        // the worker's subscription outlives the other connection
        hub.publish(BusMessage::new("ascii.render", "y")).await.unwrap();
        let msg = timeout(Duration::from_millis(100), sub.recv()).await.unwrap();
        assert_eq!(msg.unwrap().payload_text(), "y");
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.messages_published(), 0);
        assert!(bus.is_connected());
    }
}
