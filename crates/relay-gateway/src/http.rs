//! HTTP surface.
//!
//! Every role serves the introspection routes (`/version`, `/healthz`,
//! `/readinez`, `/metrics`). The root route depends on the role:
//!
//! | Role | Route | Action |
//! |------|-------|--------|
//! | api | `GET /?target&cmd&text[&token]`, `POST /?target&cmd[&token]` | dispatch over the bus and wait |
//! | api | `GET /roles` | worker announcements |
//! | ascii, img, ml5 | `POST /?cmd` | run the executor locally |
//! | data | `GET /?token`, `POST /?cmd&token` | read or write the durable record |

use crate::domain::config::GatewayConfig;
use crate::domain::envelope::{Envelope, Token};
use crate::domain::error::RequestError;
use crate::domain::pending::PendingRequestStore;
use crate::domain::role::Role;
use crate::drain::DrainController;
use crate::executor::CacheAsideExecutor;
use crate::ipc::{AnnouncementRegistry, BusRequester};
use crate::monitor::{RelayMetrics, RequestTimer};
use crate::ports::outbound::{RecordStore, ResultCache};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use shared_bus::MessageBus;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

/// State behind the introspection routes.
#[derive(Clone)]
pub struct IntrospectionState {
    pub config: Arc<GatewayConfig>,
    pub metrics: Arc<RelayMetrics>,
    pub drain: DrainController,
    pub started: Instant,
    pub bus: Arc<dyn MessageBus>,
    pub cache: Arc<dyn ResultCache>,
    pub store: Option<Arc<dyn RecordStore>>,
    pub pending: Option<Arc<PendingRequestStore>>,
}

/// State behind the api root routes.
#[derive(Clone)]
pub struct IngressState {
    pub requester: Arc<BusRequester>,
    pub announcements: Arc<AnnouncementRegistry>,
    pub metrics: Arc<RelayMetrics>,
}

/// State behind the worker root routes.
#[derive(Clone)]
pub struct WorkerHttpState {
    pub role: Role,
    pub executor: Arc<CacheAsideExecutor>,
    pub metrics: Arc<RelayMetrics>,
    pub drain: DrainController,
}

/// What the root route does for this process.
pub enum RootSurface {
    Ingress(IngressState),
    Worker(WorkerHttpState),
}

/// Build the full router for one role.
pub fn build_router(introspection: IntrospectionState, root: RootSurface) -> Router {
    let root = match root {
        RootSurface::Ingress(state) => Router::new()
            .route("/", get(ingress_get).post(ingress_post))
            .route("/roles", get(list_roles))
            .with_state(state),
        RootSurface::Worker(state) if state.role == Role::Data => Router::new()
            .route("/", get(data_get).post(worker_post))
            .with_state(state),
        RootSurface::Worker(state) => Router::new()
            .route("/", axum::routing::post(worker_post))
            .with_state(state),
    };

    Router::new()
        .route("/version", get(version))
        .route("/healthz", get(healthz))
        .route("/readinez", get(readinez))
        .route("/metrics", get(metrics))
        .with_state(introspection)
        .merge(root)
}

// --- introspection ---

async fn version(State(state): State<IntrospectionState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": state.config.app_name,
        "role": state.config.role,
        "version": state.config.version,
        "environment": state.config.environment(),
    }))
}

async fn healthz(State(state): State<IntrospectionState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started.elapsed().as_secs(),
        "requests_total": state.metrics.requests(),
    }))
}

async fn readinez(State(state): State<IntrospectionState>) -> impl IntoResponse {
    let draining = state.drain.is_draining();
    let bus = state.bus.is_connected();
    let cache = if state.config.cache.enabled {
        Some(state.cache.ping().await)
    } else {
        None
    };
    let store = if state.config.role == Role::Data {
        Some(match &state.store {
            Some(store) => store.ping().await,
            None => false,
        })
    } else {
        None
    };

    let ready = !draining && bus && cache.unwrap_or(true) && store.unwrap_or(true);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "draining": draining,
            "bus": bus,
            "cache": cache,
            "store": store,
        })),
    )
}

async fn metrics(State(state): State<IntrospectionState>) -> impl IntoResponse {
    let mut body = state.metrics.to_json();
    if let Some(pending) = &state.pending {
        body["pending"] = pending.stats_json();
    }
    Json(body)
}

// --- api role ---

#[derive(Debug, Default, Deserialize)]
pub struct IngressQuery {
    pub target: Option<String>,
    pub cmd: Option<String>,
    pub text: Option<String>,
    pub token: Option<String>,
}

impl IngressQuery {
    fn target(&self) -> Result<Role, RequestError> {
        let target = self
            .target
            .as_deref()
            .ok_or_else(|| RequestError::BadRequest("missing 'target'".into()))?;
        target
            .parse()
            .map_err(|_| RequestError::BadRequest(format!("unknown target '{}'", target)))
    }

    fn command(&self, target: Role) -> String {
        match self.cmd.as_deref() {
            Some(cmd) if !cmd.is_empty() => cmd.to_string(),
            _ => target.default_command().to_string(),
        }
    }
}

fn parse_token(raw: Option<&str>) -> Result<Option<Token>, RequestError> {
    raw.map(|t| {
        t.parse::<Token>()
            .map_err(|_| RequestError::BadRequest(format!("invalid token '{}'", t)))
    })
    .transpose()
}

async fn dispatch(
    state: &IngressState,
    query: &IngressQuery,
    payload: String,
) -> Result<String, RequestError> {
    let timer = RequestTimer::start(Arc::clone(&state.metrics));
    let result = forward(state, query, payload).await;
    timer.finish(result.is_ok());

    if let Err(e) = &result {
        debug!(error = %e, "Ingress request failed");
    }
    result
}

async fn forward(
    state: &IngressState,
    query: &IngressQuery,
    payload: String,
) -> Result<String, RequestError> {
    let target = query.target()?;
    let command = query.command(target);
    let token = parse_token(query.token.as_deref())?;
    state
        .requester
        .request(target, &command, payload, token)
        .await
}

async fn ingress_get(
    State(state): State<IngressState>,
    Query(query): Query<IngressQuery>,
) -> Result<String, RequestError> {
    let payload = query.text.clone().unwrap_or_default();
    dispatch(&state, &query, payload).await
}

async fn ingress_post(
    State(state): State<IngressState>,
    Query(query): Query<IngressQuery>,
    body: String,
) -> Result<String, RequestError> {
    dispatch(&state, &query, body).await
}

async fn list_roles(State(state): State<IngressState>) -> impl IntoResponse {
    Json(state.announcements.list())
}

// --- worker roles ---

#[derive(Debug, Default, Deserialize)]
pub struct WorkerQuery {
    pub cmd: Option<String>,
    pub token: Option<String>,
}

async fn execute_local(
    state: &WorkerHttpState,
    request: Envelope,
) -> Result<String, RequestError> {
    if state.drain.is_draining() {
        return Err(RequestError::Draining);
    }
    let timer = RequestTimer::start(Arc::clone(&state.metrics));
    let result = state.executor.execute(&request).await;
    timer.finish(result.is_ok());
    Ok(result?)
}

async fn worker_post(
    State(state): State<WorkerHttpState>,
    Query(query): Query<WorkerQuery>,
    body: String,
) -> Result<String, RequestError> {
    let token = parse_token(query.token.as_deref())?
        .unwrap_or_else(|| Token::from_digest(body.as_bytes()));
    let command = match query.cmd {
        Some(cmd) if !cmd.is_empty() => cmd,
        _ if state.role == Role::Data => "put".to_string(),
        _ => state.role.default_command().to_string(),
    };
    execute_local(&state, Envelope::one_way(token, body, command)).await
}

async fn data_get(
    State(state): State<WorkerHttpState>,
    Query(query): Query<WorkerQuery>,
) -> Result<String, RequestError> {
    let token = parse_token(query.token.as_deref())?
        .ok_or_else(|| RequestError::BadRequest("missing 'token'".into()))?;
    execute_local(&state, Envelope::one_way(token, "", "get")).await
}
