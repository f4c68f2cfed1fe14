#![allow(missing_docs)]

//! Relay Gateway - role-specialized HTTP to message-bus relay.
//!
//! One process runs exactly one role. The `api` role faces HTTP clients and
//! forwards each request over the bus; worker roles (`ascii`, `img`, `ml5`,
//! `data`) answer those requests.
//!
//! # Architecture
//!
//! ```text
//!   HTTP client
//!       │  GET /?target=ascii&text=hi
//!       ▼
//! ┌────────────────────────────┐                 ┌────────────────────────────┐
//! │  api role                  │                 │  worker role (ascii)       │
//! │                            │ ascii.json.cmd  │                            │
//! │  BusRequester ─────────────┼────────────────►│  Worker (bounded tasks)    │
//! │    │ register(token)       │                 │    │                       │
//! │    ▼                       │                 │    ▼                       │
//! │  PendingRequestStore       │                 │  CacheAsideExecutor        │
//! │    ▲                       │                 │    ├─ ResultCache          │
//! │    │ complete(token)       │ _INBOX.app.     │    └─ Compute              │
//! │  ResponseRouter ◄──────────┼─ node.token ────┤                            │
//! └────────────────────────────┘                 └────────────────────────────┘
//! ```
//!
//! # Delivery
//!
//! At-most-once, no ordering across tokens. A reply that arrives after its
//! request timed out is dropped. Workers can opt into a redelivery window
//! (`dedup_window`); it is off by default.
//!
//! # Usage
//!
//! ```ignore
//! use relay_gateway::{Collaborators, GatewayConfig, RelayService, Role};
//!
//! let config = GatewayConfig::for_role(Role::Ascii);
//! let node = RelayService::start(config, collaborators).await?;
//! tokio::signal::ctrl_c().await?;
//! node.shutdown().await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod compute;
pub mod domain;
pub mod drain;
pub mod executor;
pub mod http;
pub mod ipc;
pub mod monitor;
pub mod ports;
pub mod service;

pub use domain::{
    CacheConfig, CacheKeyMode, ConfigError, Envelope, GatewayConfig, GatewayError, RequestError,
    Role, Token,
};
pub use drain::DrainController;
pub use executor::{CacheAsideExecutor, CachePolicy};
pub use monitor::{RelayMetrics, ThroughputMonitor};
pub use service::{Collaborators, DrainReport, RelayService, RunningInstance};

/// Crate version reported by `/version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
