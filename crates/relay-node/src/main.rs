//! # Relay Node
//!
//! Runs exactly one relay role per process.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags (every flag also reads a `RELAY_*` variable)
//! 2. Install logging
//! 3. Connect the bus, the result cache and (data role) the durable store
//! 4. Start the role; serve until Ctrl+C
//! 5. Drain and exit

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Instrument};

use relay_gateway::adapters::{MemoryCache, SqliteStore};
use relay_gateway::ports::outbound::{RecordStore, ResultCache};
use relay_gateway::{Collaborators, GatewayConfig, RelayService, Role};
use relay_telemetry::{init_logging, role_span, TelemetryConfig};
use shared_bus::{InMemoryBus, MessageBus, MEMORY_URL};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = TelemetryConfig::from_env()
        .with_service_name(cli.service_name())
        .with_timestamps(cli.timestamp);
    init_logging(&telemetry).context("failed to initialize logging")?;

    let span = role_span!("relay", role = %cli.role, app = %cli.name);
    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.gateway_config();
    config
        .validate()
        .with_context(|| format!("invalid configuration for role {}", config.role))?;

    let bus = connect_bus(&cli, &config).await?;
    let cache = connect_cache(&cli).await;
    let store = open_store(&cli, config.role);

    let node = RelayService::start(config, Collaborators { bus, cache, store })
        .await
        .context("failed to start relay node")?;

    info!(addr = %node.local_addr(), "Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested, draining");
    let report = node.shutdown().await;
    info!(
        dispatched = report.dispatched,
        abandoned = report.abandoned,
        requests = report.requests_total,
        "Drained"
    );

    Ok(())
}

async fn connect_bus(cli: &Cli, config: &GatewayConfig) -> Result<Arc<dyn MessageBus>> {
    if cli.server == MEMORY_URL {
        warn!("Using in-process bus; no other process can reach this node");
        return Ok(Arc::new(InMemoryBus::new()));
    }
    connect_nats(cli, config).await
}

#[cfg(feature = "nats")]
async fn connect_nats(cli: &Cli, config: &GatewayConfig) -> Result<Arc<dyn MessageBus>> {
    let options = shared_bus::NatsOptions {
        servers: cli.server.clone(),
        name: config.connection_name(),
        credentials: cli.creds.clone(),
        ..shared_bus::NatsOptions::default()
    };
    let bus = shared_bus::NatsBus::connect(options)
        .await
        .with_context(|| format!("failed to connect to bus at {}", cli.server))?;
    Ok(Arc::new(bus))
}

#[cfg(not(feature = "nats"))]
async fn connect_nats(cli: &Cli, _config: &GatewayConfig) -> Result<Arc<dyn MessageBus>> {
    anyhow::bail!(
        "bus server '{}' needs the `nats` feature; use {} for an in-process bus",
        cli.server,
        MEMORY_URL
    )
}

async fn connect_cache(cli: &Cli) -> Arc<dyn ResultCache> {
    let Some(url) = cli.cache_url.as_deref() else {
        return Arc::new(MemoryCache::new());
    };

    #[cfg(feature = "redis")]
    {
        match relay_gateway::adapters::RedisCache::connect(url).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => warn!(url, error = %e, "Redis unavailable, using in-process cache"),
        }
    }

    #[cfg(not(feature = "redis"))]
    warn!(url, "Built without the `redis` feature, using in-process cache");

    Arc::new(MemoryCache::new())
}

fn open_store(cli: &Cli, role: Role) -> Option<Arc<dyn RecordStore>> {
    if role != Role::Data {
        return None;
    }

    match SqliteStore::open(&cli.db) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(path = %cli.db.display(), error = %e, "Durable store unavailable, records are cache-only");
            None
        }
    }
}
