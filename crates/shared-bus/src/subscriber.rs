//! # Subscription
//!
//! The receiving side of the bus. A subscription is a `Stream` of
//! [`BusMessage`]s matching one subject pattern; dropping it unsubscribes.

use crate::message::BusMessage;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tracing::debug;

/// Bookkeeping released when a subscription is dropped.
pub(crate) struct SubscriptionGuard {
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    pattern: String,
}

impl SubscriptionGuard {
    pub(crate) fn new(subscriptions: Arc<RwLock<HashMap<String, usize>>>, pattern: String) -> Self {
        if let Ok(mut subs) = subscriptions.write() {
            *subs.entry(pattern.clone()).or_insert(0) += 1;
        }
        Self {
            subscriptions,
            pattern,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        let Some(count) = subs.get_mut(&self.pattern) else {
            return;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            subs.remove(&self.pattern);
        }
        debug!(subject = %self.pattern, "Subscription dropped");
    }
}

/// A live subscription.
///
/// The stream ends when the bus is drained or the connection closes.
pub struct Subscription {
    pattern: String,
    inner: BoxStream<'static, BusMessage>,
    _guard: Option<SubscriptionGuard>,
}

impl Subscription {
    pub(crate) fn new(
        pattern: impl Into<String>,
        inner: BoxStream<'static, BusMessage>,
        guard: Option<SubscriptionGuard>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            inner,
            _guard: guard,
        }
    }

    /// Build a subscription over an arbitrary message stream.
    ///
    /// Used by transports outside this crate and by test doubles.
    pub fn from_stream<S>(pattern: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = BusMessage> + Send + 'static,
    {
        Self::new(pattern, stream.boxed(), None)
    }

    /// Receive the next message, `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.inner.next().await
    }

    /// Subject pattern this subscription was created with.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Stream for Subscription {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{InMemoryBus, MessageBus};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("ascii.*").await.unwrap();

        bus.publish(BusMessage::new("ascii.render", "hello"))
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");

        assert_eq!(received.subject, "ascii.render");
        assert_eq!(received.payload_text(), "hello");
    }

    #[tokio::test]
    async fn test_subscription_filters_subjects() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("ascii.json.*").await.unwrap();

        bus.publish(BusMessage::new("img.json.scan", "skip me"))
            .await
            .unwrap();
        bus.publish(BusMessage::new("ascii.json.render", "take me"))
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");

        assert_eq!(received.payload_text(), "take me");
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryBus::new();

        {
            let _sub1 = bus.subscribe("ascii.*").await.unwrap();
            let _sub2 = bus.subscribe("ascii.*").await.unwrap();
            assert_eq!(bus.subscriber_count(), 2);
            assert_eq!(bus.subscriptions_for("ascii.*"), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.subscriptions_for("ascii.*"), 0);
    }

    #[tokio::test]
    async fn test_from_stream() {
        let msgs = vec![BusMessage::new("a.b", "1"), BusMessage::new("a.c", "2")];
        let mut sub = Subscription::from_stream("a.*", futures::stream::iter(msgs));

        assert_eq!(sub.pattern(), "a.*");
        assert_eq!(sub.recv().await.unwrap().subject, "a.b");
        assert_eq!(sub.recv().await.unwrap().subject, "a.c");
        assert!(sub.recv().await.is_none());
    }
}
