//! Heartbeat monitor: periodic liveness pings for every live connection.
//!
//! Each tick takes a snapshot of the registry (the lock is released before any
//! ping is written) and pings every connection concurrently, with at most
//! `heartbeat_concurrency` pings in flight and each ping bounded by
//! `ping_timeout`. A failed ping is only logged; eviction belongs to the read
//! loop and to the dispatcher's write-failure tracking.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures_util::{StreamExt, stream};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{config::HubConfig, domain::ConnectionRepository};

/// `interval_at` rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one heartbeat round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub pinged: usize,
    pub failed: usize,
}

pub struct HeartbeatMonitor {
    repository: Arc<dyn ConnectionRepository>,
    interval: Duration,
    ping_timeout: Duration,
    concurrency: usize,
}

impl HeartbeatMonitor {
    pub fn new(config: &HubConfig, repository: Arc<dyn ConnectionRepository>) -> Self {
        Self {
            repository,
            interval: config.heartbeat_interval.max(MIN_INTERVAL),
            ping_timeout: config.ping_timeout,
            concurrency: config.heartbeat_concurrency.max(1),
        }
    }

    /// Run the monitor until `shutdown` fires
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) {
        // First ping one full interval after start
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                report = self.ping_all() => {
                    if report.failed > 0 {
                        tracing::info!(
                            pinged = report.pinged,
                            failed = report.failed,
                            "Heartbeat round finished with failures"
                        );
                    } else {
                        tracing::debug!(pinged = report.pinged, "Heartbeat round finished");
                    }
                }
            }
        }
        tracing::debug!("Heartbeat monitor stopped");
    }

    /// Ping every registered connection once
    pub async fn ping_all(&self) -> HeartbeatReport {
        let connections = self.repository.all_connections().await;
        let pinged = connections.len();
        let failed = AtomicUsize::new(0);

        stream::iter(connections)
            .for_each_concurrent(self.concurrency, |connection| {
                let failed = &failed;
                async move {
                    let error = match tokio::time::timeout(self.ping_timeout, connection.ping()).await
                    {
                        Ok(Ok(())) => return,
                        Ok(Err(e)) => e.to_string(),
                        Err(_) => format!("ping timed out after {:?}", self.ping_timeout),
                    };
                    failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        college_id = %connection.tenant_id(),
                        user_id = %connection.user_id(),
                        connection_id = %connection.id(),
                        "Heartbeat ping failed: {}",
                        error
                    );
                }
            })
            .await;

        HeartbeatReport {
            pinged,
            failed: failed.load(Ordering::Relaxed),
        }
    }
}
