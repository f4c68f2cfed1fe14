//! Role dispatcher and process lifecycle.
//!
//! [`RelayService::start`] turns a validated [`GatewayConfig`] plus connected
//! collaborators into a [`RunningInstance`] for exactly one role. The role is
//! chosen once here; nothing downstream branches on it per request.

use crate::compute;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::pending::{cleanup_task, PendingRequestStore};
use crate::domain::role::Role;
use crate::drain::DrainController;
use crate::executor::{CacheAsideExecutor, CachePolicy};
use crate::http::{build_router, IngressState, IntrospectionState, RootSurface, WorkerHttpState};
use crate::ipc::{AnnouncementRegistry, BusRequester, ResponseRouter, Worker, WorkerOptions};
use crate::monitor::{RelayMetrics, ThroughputMonitor, MONITOR_PERIOD};
use crate::ports::outbound::{RecordStore, ResultCache};
use shared_bus::{BusMessage, MessageBus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How often abandoned pending records are swept.
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Poll interval while waiting for outstanding ingress requests to finish.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// External collaborators, already connected.
pub struct Collaborators {
    pub bus: Arc<dyn MessageBus>,
    pub cache: Arc<dyn ResultCache>,
    /// Durable store; only used by the `data` role
    pub store: Option<Arc<dyn RecordStore>>,
}

/// Outcome of a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Bus messages the worker loop dispatched over its lifetime
    pub dispatched: u64,
    /// Ingress requests still waiting when the drain gave up on them
    pub abandoned: usize,
    /// Requests counted by the throughput monitor
    pub requests_total: u64,
}

pub struct RelayService;

impl RelayService {
    /// Start the configured role.
    ///
    /// Fails on an invalid configuration, a bus subscription failure or an
    /// HTTP bind failure. An unusable durable store only degrades the data
    /// role.
    pub async fn start(
        config: GatewayConfig,
        collaborators: Collaborators,
    ) -> Result<RunningInstance, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let config = Arc::new(config);
        let role = config.role;
        let Collaborators { bus, cache, store } = collaborators;
        let metrics = Arc::new(RelayMetrics::new());
        let drain = DrainController::new();
        let started = Instant::now();
        let mut background = Vec::new();

        info!(
            role = %role,
            environment = %config.environment(),
            cache = config.cache.enabled,
            "Starting relay node"
        );

        // A taken port must fail before any task is spawned
        let addr = config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let store = match (role, store) {
            (Role::Data, Some(store)) => match store.ensure_schema().await {
                Ok(()) => Some(store),
                Err(e) => {
                    warn!(error = %e, "Durable store unusable, data requests will fail");
                    None
                }
            },
            (Role::Data, None) => {
                warn!("No durable store configured, data requests will fail");
                None
            }
            _ => None,
        };

        let (root, worker, pending) = match compute::for_role(role, store.clone()) {
            Some(compute) => {
                let executor = Arc::new(CacheAsideExecutor::new(
                    compute,
                    Arc::clone(&cache),
                    CachePolicy::from_config(&config),
                    Arc::clone(&metrics),
                ));
                let worker = Worker::new(
                    role,
                    Arc::clone(&bus),
                    Arc::clone(&executor),
                    Arc::clone(&metrics),
                    WorkerOptions {
                        max_in_flight: config.max_in_flight,
                        dedup_window: config.dedup_window,
                    },
                    drain.clone(),
                );
                let (general, json) = worker.subscribe().await?;
                announce(bus.as_ref(), &config).await;

                let root = RootSurface::Worker(WorkerHttpState {
                    role,
                    executor,
                    metrics: Arc::clone(&metrics),
                    drain: drain.clone(),
                });
                (root, Some(tokio::spawn(worker.run(general, json))), None)
            }
            None => {
                let pending = Arc::new(PendingRequestStore::new(config.wait_timeout));
                let node_id = Uuid::new_v4().simple().to_string();
                let inbox = config.inbox_prefix(&node_id);

                let replies = bus.subscribe(&format!("{}.*", inbox)).await?;
                let announcements = bus.subscribe("api.>").await?;
                let registry = Arc::new(AnnouncementRegistry::new());

                background.push(tokio::spawn(
                    ResponseRouter::new(Arc::clone(&pending)).run(replies),
                ));
                background.push(tokio::spawn(Arc::clone(&registry).run(announcements)));
                background.push(tokio::spawn(cleanup_task(
                    Arc::clone(&pending),
                    PENDING_SWEEP_INTERVAL,
                )));

                let requester = Arc::new(BusRequester::new(
                    Arc::clone(&bus),
                    Arc::clone(&pending),
                    inbox.clone(),
                    config.wait_timeout,
                    drain.clone(),
                    Arc::clone(&metrics),
                ));
                info!(inbox = %inbox, wait_ms = config.wait_timeout.as_millis() as u64, "Ingress ready");

                let root = RootSurface::Ingress(IngressState {
                    requester,
                    announcements: registry,
                    metrics: Arc::clone(&metrics),
                });
                (root, None, Some(pending))
            }
        };

        let introspection = IntrospectionState {
            config: Arc::clone(&config),
            metrics: Arc::clone(&metrics),
            drain: drain.clone(),
            started,
            bus: Arc::clone(&bus),
            cache,
            store,
            pending: pending.clone(),
        };
        let router = build_router(introspection, root);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        info!(addr = %local_addr, "HTTP server listening");

        background.push(tokio::spawn(
            ThroughputMonitor::starting_at(role, Arc::clone(&metrics), started).run(MONITOR_PERIOD),
        ));

        Ok(RunningInstance {
            config,
            local_addr,
            bus,
            drain,
            metrics,
            pending,
            worker,
            server,
            server_shutdown: shutdown_tx,
            background,
        })
    }
}

/// Publish the role's usage on the discovery subject. Best effort.
async fn announce(bus: &dyn MessageBus, config: &GatewayConfig) {
    let subject = config.discovery_subject();
    let usage = config.role.usage();
    match bus.publish(BusMessage::new(subject.clone(), usage)).await {
        Ok(()) => info!(subject = %subject, usage = usage, "Announced"),
        Err(e) => warn!(subject = %subject, error = %e, "Announcement failed"),
    }
}

/// A started role.
pub struct RunningInstance {
    config: Arc<GatewayConfig>,
    local_addr: SocketAddr,
    bus: Arc<dyn MessageBus>,
    drain: DrainController,
    metrics: Arc<RelayMetrics>,
    pending: Option<Arc<PendingRequestStore>>,
    worker: Option<JoinHandle<u64>>,
    server: JoinHandle<std::io::Result<()>>,
    server_shutdown: oneshot::Sender<()>,
    background: Vec<JoinHandle<()>>,
}

impl RunningInstance {
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn drain_handle(&self) -> DrainController {
        self.drain.clone()
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.pending_count())
    }

    /// Drain and stop.
    ///
    /// Intake stops first; in-flight work is allowed to finish, ingress
    /// requests up to the wait timeout. The bus is then drained so queued
    /// replies are flushed, and the HTTP server stops.
    pub async fn shutdown(self) -> DrainReport {
        let Self {
            config,
            bus,
            drain,
            metrics,
            pending,
            worker,
            server,
            server_shutdown,
            background,
            ..
        } = self;

        info!(role = %config.role, "Draining");
        drain.begin();

        let dispatched = match worker {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                error!(error = %e, "Worker task failed");
                0
            }),
            None => 0,
        };

        let abandoned = match &pending {
            Some(pending) => wait_for_pending(pending, config.wait_timeout).await,
            None => 0,
        };
        if abandoned > 0 {
            warn!(abandoned, "Ingress requests still pending after drain wait");
        }

        if let Err(e) = bus.drain().await {
            warn!(error = %e, "Bus drain failed");
        }

        let _ = server_shutdown.send(());
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "HTTP server stopped with error"),
            Err(e) => warn!(error = %e, "HTTP server task failed"),
        }

        for task in background {
            task.abort();
        }

        let report = DrainReport {
            dispatched,
            abandoned,
            requests_total: metrics.requests(),
        };
        info!(
            role = %config.role,
            dispatched = report.dispatched,
            requests = report.requests_total,
            "Stopped"
        );
        report
    }
}

/// Wait until no request is pending or `limit` elapses. Returns what is left.
async fn wait_for_pending(pending: &PendingRequestStore, limit: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let left = pending.pending_count();
        if left == 0 || tokio::time::Instant::now() >= deadline {
            return left;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}
