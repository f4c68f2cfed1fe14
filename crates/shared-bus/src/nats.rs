//! # NATS Transport
//!
//! `MessageBus` over a NATS server via `async-nats`. Enabled with the `nats`
//! feature; the relay node uses it for every `nats://` server URL.
//!
//! Connection events are logged. A lost connection is retried with a
//! capped linear backoff; publishes made while reconnecting are buffered by
//! the client. Draining unsubscribes every subscription, delivers what the
//! server already sent, flushes, and closes the connection.

use crate::error::BusError;
use crate::message::BusMessage;
use crate::publisher::MessageBus;
use crate::subject::{validate_publish_subject, SubjectPattern};
use crate::subscriber::{Subscription, SubscriptionGuard};
use async_nats::Event;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reconnect attempts before the client gives up.
pub const DEFAULT_MAX_RECONNECTS: usize = 60;

/// Upper bound on the wait between reconnect attempts.
pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(2);

/// Connection options.
#[derive(Debug, Clone)]
pub struct NatsOptions {
    /// Comma-separated server URLs.
    pub servers: String,
    /// Client name shown by the server (`"<role> on <subject>"`).
    pub name: String,
    /// Optional user credentials file.
    pub credentials: Option<PathBuf>,
    /// Reconnect attempts after a lost connection.
    pub max_reconnects: usize,
    /// Longest wait between reconnect attempts.
    pub reconnect_wait: Duration,
}

impl Default for NatsOptions {
    fn default() -> Self {
        Self {
            servers: crate::DEFAULT_NATS_URL.to_string(),
            name: String::new(),
            credentials: None,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            reconnect_wait: DEFAULT_RECONNECT_WAIT,
        }
    }
}

/// Wait before reconnect attempt `attempts`: 250ms steps up to `cap`.
pub fn reconnect_delay(attempts: usize, cap: Duration) -> Duration {
    let steps = u32::try_from(attempts).unwrap_or(u32::MAX);
    Duration::from_millis(250).saturating_mul(steps).min(cap)
}

async fn log_event(event: Event) {
    match event {
        Event::Connected => info!("NATS connection established"),
        Event::Disconnected => warn!("NATS connection lost, reconnecting"),
        Event::LameDuckMode => warn!("NATS server entering lame duck mode"),
        Event::SlowConsumer(sid) => warn!(sid, "NATS slow consumer, messages dropped"),
        other => info!(event = ?other, "NATS connection event"),
    }
}

/// NATS-backed bus client.
pub struct NatsBus {
    client: async_nats::Client,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    messages_published: AtomicU64,
}

impl NatsBus {
    /// Connect to the configured servers.
    pub async fn connect(options: NatsOptions) -> Result<Self, BusError> {
        let connect_options = match &options.credentials {
            Some(path) => async_nats::ConnectOptions::with_credentials_file(path.clone())
                .await
                .map_err(|e| BusError::Connect(format!("credentials {}: {}", path.display(), e)))?,
            None => async_nats::ConnectOptions::new(),
        };

        let cap = options.reconnect_wait;
        let client = connect_options
            .name(options.name.clone())
            .max_reconnects(options.max_reconnects)
            .reconnect_delay_callback(move |attempts| reconnect_delay(attempts, cap))
            .event_callback(log_event)
            .connect(options.servers.as_str())
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        info!(
            servers = %options.servers,
            name = %options.name,
            max_reconnects = options.max_reconnects,
            "Connected to NATS"
        );

        let (closed_tx, _) = watch::channel(false);
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
            closed_tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
        })
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .map(|subs| subs.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        validate_publish_subject(&message.subject)?;

        let subject = message.subject.clone();
        let result = match message.reply {
            Some(reply) => {
                self.client
                    .publish_with_reply(message.subject, reply, message.payload)
                    .await
            }
            None => self.client.publish(message.subject, message.payload).await,
        };
        result.map_err(|e| BusError::Publish {
            subject: subject.clone(),
            reason: e.to_string(),
        })?;

        self.messages_published.fetch_add(1, Ordering::Relaxed);
        debug!(subject = %subject, "Message published");
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        SubjectPattern::parse(pattern)?;

        let subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| BusError::Subscribe {
                subject: pattern.to_string(),
                reason: e.to_string(),
            })?;

        // Ends once the client drains, or locally if the drain failed
        let mut closed = self.closed_tx.subscribe();
        let stream = subscriber
            .map(|msg| BusMessage {
                subject: msg.subject.to_string(),
                reply: msg.reply.map(|r| r.to_string()),
                payload: msg.payload,
            })
            .take_until(async move {
                let _ = closed.wait_for(|closed| *closed).await;
            });

        let guard = SubscriptionGuard::new(Arc::clone(&self.subscriptions), pattern.to_string());
        debug!(subject = pattern, "NATS subscription created");
        Ok(Subscription::new(pattern, stream.boxed(), Some(guard)))
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Flush(e.to_string()))
    }

    async fn drain(&self) -> Result<(), BusError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let subscriptions = self.subscription_count();
        let result = self
            .client
            .drain()
            .await
            .map_err(|e| BusError::Flush(e.to_string()));
        self.closed_tx.send_replace(true);
        result?;

        info!(
            subscriptions,
            published = self.messages_published(),
            "NATS connection drained"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self.client.connection_state() == async_nats::connection::State::Connected
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}
