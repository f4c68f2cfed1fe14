//! # Shared Bus - Subject-Addressed Message Bus
//!
//! Every relay role talks to every other role through this crate only.
//! Messages are addressed by dot-separated subjects and may carry a reply
//! subject, which is how the ingress node correlates answers from workers.
//!
//! ```text
//! ┌──────────────┐   publish("ascii.json.render", reply=_INBOX...)   ┌──────────────┐
//! │  api role    │ ────────────────────────┐                          │ ascii role   │
//! │              │                         ▼                          │              │
//! └──────────────┘                  ┌──────────────┐  subscribe()     └──────────────┘
//!         ▲                         │  MessageBus  │ ─────────────────────────▲
//!         └──────── reply ───────── │              │ ◄──── publish(reply) ────┘
//!                                   └──────────────┘
//! ```
//!
//! ## Subjects
//!
//! - `*` matches exactly one token (`ascii.*` matches `ascii.render`)
//! - `>` matches one or more trailing tokens (`api.>` matches `api.k8sdiy-ascii:0.1.0`)
//!
//! ## Delivery
//!
//! At-most-once per subscription with no ordering guarantee across subjects.
//! Redelivered messages are not detected by the bus itself; see
//! [`RedeliveryFilter`] for the opt-in window used by workers.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod message;
#[cfg(feature = "nats")]
pub mod nats;
pub mod publisher;
pub mod redelivery;
pub mod subject;
pub mod subscriber;

pub use error::BusError;
pub use message::BusMessage;
#[cfg(feature = "nats")]
pub use nats::{NatsBus, NatsOptions};
pub use publisher::{InMemoryBus, MessageBus};
pub use redelivery::{RedeliveryError, RedeliveryFilter};
pub use subject::SubjectPattern;
pub use subscriber::Subscription;

/// Maximum messages buffered per in-memory subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// URL scheme selecting the in-process bus instead of a network broker.
pub const MEMORY_URL: &str = "memory://";

/// Local NATS server, used when no bus address is given.
pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
