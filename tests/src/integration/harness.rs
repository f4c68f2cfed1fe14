//! Node startup and HTTP helpers.

use relay_gateway::adapters::{MemoryCache, SqliteStore};
use relay_gateway::ports::outbound::RecordStore;
use relay_gateway::{Collaborators, GatewayConfig, RelayService, Role, RunningInstance};
use shared_bus::InMemoryBus;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_millis(400);

/// Configuration for a node bound to an ephemeral loopback port.
pub fn config(role: Role) -> GatewayConfig {
    GatewayConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        wait_timeout: WAIT,
        ..GatewayConfig::for_role(role)
    }
}

/// Start a node on its own connection to `hub`.
pub async fn start(hub: &InMemoryBus, config: GatewayConfig) -> RunningInstance {
    let store = match config.role {
        Role::Data => {
            let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
            Some(store)
        }
        _ => None,
    };
    let collaborators = Collaborators {
        bus: Arc::new(hub.connection()),
        cache: Arc::new(MemoryCache::new()),
        store,
    };
    RelayService::start(config, collaborators).await.unwrap()
}

pub async fn start_role(hub: &InMemoryBus, role: Role) -> RunningInstance {
    start(hub, config(role)).await
}

/// Response status and body.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    async fn read(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap();
        Self { status, body }
    }
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

// Nodes listen on loopback; a proxy from the environment must not intercept.
fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub async fn get(addr: SocketAddr, path: &str) -> Reply {
    let response = client().get(url(addr, path)).send().await.unwrap();
    Reply::read(response).await
}

pub async fn post(addr: SocketAddr, path: &str, body: &str) -> Reply {
    let response = client()
        .post(url(addr, path))
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    Reply::read(response).await
}

/// Poll `/roles` on an api node until `count` workers announced themselves.
pub async fn wait_for_roles(api: SocketAddr, count: usize) -> serde_json::Value {
    for _ in 0..50 {
        let roles = get(api, "/roles").await.json();
        if roles.as_array().map_or(0, Vec::len) >= count {
            return roles;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fewer than {count} roles announced");
}
