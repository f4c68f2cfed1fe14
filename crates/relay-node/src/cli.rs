use clap::{ArgAction, Parser};
use relay_gateway::{CacheConfig, CacheKeyMode, GatewayConfig, Role};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "relay-node")]
#[command(about = "Role-specialized HTTP to message-bus relay")]
#[command(version)]
pub struct Cli {
    /// Application name, first part of every subject and identity
    #[arg(long, env = "RELAY_NAME", default_value = "k8sdiy")]
    pub name: String,

    /// Role this process runs: api, data, ascii, img or ml5
    #[arg(long, env = "RELAY_ROLE", default_value = "api")]
    pub role: Role,

    /// HTTP bind address
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// HTTP port
    #[arg(long, short = 'p', env = "RELAY_PORT", default_value = "8080")]
    pub port: u16,

    /// Use the result cache
    #[arg(long, env = "RELAY_CACHE", default_value = "true", action = ArgAction::Set)]
    pub cache: bool,

    /// Result cache entry lifetime
    #[arg(long, env = "RELAY_CACHE_TTL", default_value = "300", value_parser = parse_duration)]
    pub cache_ttl: Duration,

    /// Cache key derivation override: token or digest
    #[arg(long, env = "RELAY_CACHE_KEY")]
    pub cache_key: Option<CacheKeyMode>,

    /// Redis address for a shared cache (in-process cache when unset)
    #[arg(long, env = "RELAY_CACHE_URL")]
    pub cache_url: Option<String>,

    /// How long the api role waits for a worker reply
    #[arg(long, short = 'w', env = "RELAY_WAIT", default_value = "2", value_parser = parse_duration)]
    pub wait: Duration,

    /// Bus servers, comma-separated; memory:// runs an in-process bus
    #[arg(long, short = 's', env = "RELAY_SERVER", default_value = shared_bus::DEFAULT_NATS_URL)]
    pub server: String,

    /// User credentials file for the bus
    #[arg(long, env = "RELAY_CREDS")]
    pub creds: Option<PathBuf>,

    /// Durable record database (data role)
    #[arg(long, env = "RELAY_DB", default_value = "relay-data.db")]
    pub db: PathBuf,

    /// Concurrent handlers per worker subscription
    #[arg(long, env = "RELAY_MAX_IN_FLIGHT", default_value = "256")]
    pub max_in_flight: usize,

    /// Drop redelivered requests seen within this window
    #[arg(long, env = "RELAY_DEDUP_WINDOW", value_parser = parse_duration)]
    pub dedup_window: Option<Duration>,

    /// Prefix log lines with a timestamp
    #[arg(long, env = "RELAY_TIMESTAMP")]
    pub timestamp: bool,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Bare numbers are seconds
    if let Ok(secs) = s.parse::<f64>() {
        if let Ok(d) = Duration::try_from_secs_f64(secs) {
            return Ok(d);
        }
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 2, 0.5, 500ms, 5m",
        s
    ))
}

impl Cli {
    /// Relay configuration for this invocation.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            app_name: self.name.clone(),
            role: self.role,
            host: self.host,
            port: self.port,
            cache: CacheConfig {
                enabled: self.cache,
                ttl: self.cache_ttl,
                key_mode: self.cache_key,
            },
            wait_timeout: self.wait,
            max_in_flight: self.max_in_flight,
            dedup_window: self.dedup_window,
            ..GatewayConfig::default()
        }
    }

    /// Log service name: `<name>-<role>`
    pub fn service_name(&self) -> String {
        format!("{}-{}", self.name, self.role)
    }
}
