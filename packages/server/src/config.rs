//! Hub and server configuration.
//!
//! `HubConfig::default()` carries the production defaults; the server binary
//! builds it from `ServerArgs`, which reads flags or `HUB_*` environment
//! variables.

use std::time::Duration;

use clap::{Parser, ValueEnum};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_WORKER_COUNT: usize = 10;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_CONCURRENCY: usize = 64;
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Origins accepted when no allow-list is configured
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// What to do with a broadcast task when the dispatch queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the task being enqueued; the caller never waits
    DropNewest,
    /// Wait up to `timeout` for a free slot, then drop the task
    Block { timeout: Duration },
}

/// Runtime configuration of the notification hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the shared dispatch queue
    pub queue_capacity: usize,
    /// Number of dispatch workers
    pub worker_count: usize,
    /// Upper bound for one socket write performed by a worker
    pub write_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
    /// Consecutive write failures after which a connection is evicted
    pub max_write_failures: u32,
    pub heartbeat_interval: Duration,
    /// Pings in flight at once during one heartbeat round
    pub heartbeat_concurrency: usize,
    pub ping_timeout: Duration,
    /// Accepted `Origin` values for the upgrade request
    pub allowed_origins: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            overflow_policy: OverflowPolicy::DropNewest,
            max_write_failures: crate::domain::DEFAULT_MAX_WRITE_FAILURES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_concurrency: DEFAULT_HEARTBEAT_CONCURRENCY,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            allowed_origins: default_origins(),
        }
    }
}

fn default_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS
        .iter()
        .map(|origin| origin.to_string())
        .collect()
}

impl HubConfig {
    /// Whether an upgrade request carrying `origin` may proceed.
    ///
    /// An empty allow-list falls back to the local defaults.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        if self.allowed_origins.is_empty() {
            return DEFAULT_ALLOWED_ORIGINS.contains(&origin);
        }
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.trim_end_matches('/') == origin)
    }
}

/// Overflow policy as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverflowPolicyArg {
    DropNewest,
    Block,
}

/// Command line arguments of the hub server
#[derive(Debug, Parser)]
#[command(
    name = "campus-notify-server",
    version,
    about = "Real-time notification broadcast hub"
)]
pub struct ServerArgs {
    #[arg(long, env = "HUB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "HUB_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Comma separated list of accepted origins
    #[arg(long, env = "HUB_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "HUB_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    #[arg(long, env = "HUB_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,

    #[arg(long, env = "HUB_HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    #[arg(long, env = "HUB_HEARTBEAT_CONCURRENCY", default_value_t = DEFAULT_HEARTBEAT_CONCURRENCY)]
    pub heartbeat_concurrency: usize,

    #[arg(long, env = "HUB_PING_TIMEOUT_SECS", default_value_t = 10)]
    pub ping_timeout_secs: u64,

    #[arg(long, env = "HUB_WRITE_TIMEOUT_SECS", default_value_t = 10)]
    pub write_timeout_secs: u64,

    #[arg(long, env = "HUB_OVERFLOW_POLICY", value_enum, default_value_t = OverflowPolicyArg::DropNewest)]
    pub overflow_policy: OverflowPolicyArg,

    /// Only used with `--overflow-policy block`
    #[arg(long, env = "HUB_BLOCK_TIMEOUT_MS", default_value_t = 50)]
    pub block_timeout_ms: u64,

    #[arg(long, env = "HUB_MAX_WRITE_FAILURES", default_value_t = crate::domain::DEFAULT_MAX_WRITE_FAILURES)]
    pub max_write_failures: u32,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn hub_config(&self) -> HubConfig {
        let allowed_origins: Vec<String> = self
            .allowed_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        HubConfig {
            queue_capacity: self.queue_capacity.max(1),
            worker_count: self.workers.max(1),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            overflow_policy: match self.overflow_policy {
                OverflowPolicyArg::DropNewest => OverflowPolicy::DropNewest,
                OverflowPolicyArg::Block => OverflowPolicy::Block {
                    timeout: Duration::from_millis(self.block_timeout_ms),
                },
            },
            max_write_failures: self.max_write_failures.max(1),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            heartbeat_concurrency: self.heartbeat_concurrency.max(1),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            allowed_origins: if allowed_origins.is_empty() {
                default_origins()
            } else {
                allowed_origins
            },
        }
    }
}
