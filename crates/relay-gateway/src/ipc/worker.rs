//! Subscribe side of the bus reply protocol (worker roles).
//!
//! A worker listens on `<role>.*` (raw payloads, bus-native reply subject)
//! and `<role>.json.*` (JSON envelopes). Every message runs in its own task
//! through the cache-aside executor; a semaphore bounds how many run at
//! once, which also backpressures the subscription.

use crate::domain::envelope::{Envelope, EnvelopeError, Token};
use crate::domain::error::ComputeError;
use crate::domain::role::Role;
use crate::drain::DrainController;
use crate::executor::CacheAsideExecutor;
use crate::monitor::RelayMetrics;
use futures::StreamExt;
use parking_lot::Mutex;
use shared_bus::{BusError, BusMessage, MessageBus, RedeliveryFilter, Subscription};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// How an inbound request was encoded; replies use the same encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `<role>.<command>`: raw payload, reply on the bus reply subject
    Raw,
    /// `<role>.json.<command>`: JSON envelope in, JSON envelope out
    Json,
}

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub envelope: Envelope,
    pub encoding: Encoding,
}

impl Inbound {
    pub fn parse(msg: &BusMessage) -> Result<Self, EnvelopeError> {
        let tokens: Vec<&str> = msg.subject.split('.').collect();
        let command = msg.last_token();

        if tokens.len() == 3 && tokens[1] == "json" {
            let mut envelope = Envelope::decode(&msg.payload)?;
            if envelope.command.is_empty() {
                envelope.command = command.to_string();
            }
            return Ok(Self {
                envelope,
                encoding: Encoding::Json,
            });
        }

        // Raw requests carry no token; equal payloads share one
        let envelope = Envelope::request(
            Token::from_digest(&msg.payload),
            msg.payload_text(),
            msg.reply.clone().unwrap_or_default(),
            command,
        );
        Ok(Self {
            envelope,
            encoding: Encoding::Raw,
        })
    }

    pub fn expects_reply(&self) -> bool {
        self.envelope.expects_reply()
    }

    /// Reply message for `outcome`, `None` for one-way requests.
    pub fn reply(&self, outcome: &Result<String, ComputeError>) -> Result<Option<BusMessage>, EnvelopeError> {
        if !self.expects_reply() {
            return Ok(None);
        }
        let subject = self.envelope.reply_to.as_str();
        let msg = match self.encoding {
            Encoding::Json => {
                let reply = match outcome {
                    Ok(result) => self.envelope.reply(result.as_str()),
                    Err(e) => self.envelope.error_reply(e.to_string()),
                };
                BusMessage::new(subject, reply.encode()?)
            }
            // Raw callers only see text; a failure is an empty reply
            Encoding::Raw => match outcome {
                Ok(result) => BusMessage::new(subject, result.clone()),
                Err(_) => BusMessage::new(subject, bytes::Bytes::new()),
            },
        };
        Ok(Some(msg))
    }
}

/// Worker tuning.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub max_in_flight: usize,
    pub dedup_window: Option<Duration>,
}

/// State shared by every per-message task.
struct WorkerShared {
    role: Role,
    bus: Arc<dyn MessageBus>,
    executor: Arc<CacheAsideExecutor>,
    metrics: Arc<RelayMetrics>,
    dedup: Option<Mutex<RedeliveryFilter>>,
}

pub struct Worker {
    shared: Arc<WorkerShared>,
    max_in_flight: u32,
    drain: DrainController,
}

impl Worker {
    pub fn new(
        role: Role,
        bus: Arc<dyn MessageBus>,
        executor: Arc<CacheAsideExecutor>,
        metrics: Arc<RelayMetrics>,
        options: WorkerOptions,
        drain: DrainController,
    ) -> Self {
        Self {
            shared: Arc::new(WorkerShared {
                role,
                bus,
                executor,
                metrics,
                dedup: options
                    .dedup_window
                    .map(|window| Mutex::new(RedeliveryFilter::new(window))),
            }),
            max_in_flight: u32::try_from(options.max_in_flight.max(1)).unwrap_or(u32::MAX),
            drain,
        }
    }

    /// Subscribe to the general and JSON subjects of the role.
    pub async fn subscribe(&self) -> Result<(Subscription, Subscription), BusError> {
        let role = self.shared.role;
        let general = self.shared.bus.subscribe(&role.subject()).await?;
        let json = self.shared.bus.subscribe(&role.json_subject()).await?;
        info!(role = %role, general = %role.subject(), json = %role.json_subject(), "Subscribed");
        Ok((general, json))
    }

    /// Dispatch messages until drain begins or both subscriptions end, then
    /// wait for in-flight work. Returns the number of messages dispatched.
    pub async fn run(self, general: Subscription, json: Subscription) -> u64 {
        let limit = Arc::new(Semaphore::new(self.max_in_flight as usize));
        let mut inbound = futures::stream::select(general, json);
        let mut dispatched = 0u64;

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.drain.wait() => break,
                permit = Arc::clone(&limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let msg = tokio::select! {
                biased;
                _ = self.drain.wait() => break,
                msg = inbound.next() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            dispatched += 1;
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                shared.handle(msg).await;
                drop(permit);
            });
        }

        // Stop intake, then let in-flight handlers finish
        drop(inbound);
        let in_flight = self.max_in_flight as usize - limit.available_permits();
        if in_flight > 0 {
            info!(role = %self.shared.role, in_flight, "Waiting for in-flight requests");
        }
        if limit.acquire_many(self.max_in_flight).await.is_err() {
            warn!(role = %self.shared.role, "Concurrency limit closed while draining");
        }

        info!(role = %self.shared.role, dispatched, "Worker stopped");
        dispatched
    }
}

impl WorkerShared {
    async fn handle(&self, msg: BusMessage) {
        self.metrics.record_request();
        let started = Instant::now();

        let inbound = match Inbound::parse(&msg) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.metrics.record_outcome(false, 0);
                warn!(role = %self.role, subject = %msg.subject, error = %e, "Malformed request dropped");
                return;
            }
        };
        let token = inbound.envelope.token;

        if let Some(filter) = &self.dedup {
            let seen = filter
                .lock()
                .check_and_record(token.get(), &inbound.envelope.reply_to);
            if let Err(e) = seen {
                self.metrics.record_duplicate();
                debug!(role = %self.role, error = %e, "Redelivered request dropped");
                return;
            }
        }

        let outcome = self.executor.execute(&inbound.envelope).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_outcome(outcome.is_ok(), latency_ms);

        match &outcome {
            Ok(_) => debug!(role = %self.role, token = %token, latency_ms, "Request executed"),
            Err(e) => warn!(role = %self.role, token = %token, error = %e, "Request failed"),
        }

        let reply = match inbound.reply(&outcome) {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                self.metrics.record_reply(false);
                warn!(role = %self.role, token = %token, error = %e, "Reply encoding failed");
                return;
            }
        };

        match self.bus.publish(reply).await {
            Ok(()) => self.metrics.record_reply(true),
            Err(e) => {
                self.metrics.record_reply(false);
                warn!(role = %self.role, token = %token, error = %e, "Reply publish failed");
            }
        }
    }
}
