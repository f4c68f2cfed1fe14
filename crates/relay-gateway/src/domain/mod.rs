//! Domain layer: envelope, roles, configuration, errors and the pending
//! request store.

pub mod config;
pub mod envelope;
pub mod error;
pub mod pending;
pub mod role;

pub use config::{CacheConfig, ConfigError, GatewayConfig};
pub use envelope::{Envelope, EnvelopeError, Token, TokenGenerator};
pub use error::{CacheError, ComputeError, GatewayError, RequestError, StoreError};
pub use pending::{PendingReply, PendingRequestStore};
pub use role::{CacheKeyMode, Role};
