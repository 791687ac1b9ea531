//! Broadcast dispatcher: one bounded queue drained by a fixed pool of workers.
//!
//! Deciding who receives a broadcast (the hub) is decoupled from writing
//! bytes to sockets (the workers). Enqueueing never waits on a socket; when
//! the queue is full the configured `OverflowPolicy` decides whether the task
//! is dropped at once or after a bounded wait. Every task gets exactly one
//! write attempt. Tasks still queued when the stop signal fires are abandoned.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, error::SendTimeoutError, error::TrySendError},
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{HubConfig, OverflowPolicy},
    domain::{Connection, ConnectionHealth, ConnectionRepository, SinkError, UserId},
};

/// One pending write: a target connection and the shared encoded frame
#[derive(Debug)]
pub struct BroadcastTask {
    pub connection: Arc<Connection>,
    pub user_id: UserId,
    pub payload: Arc<str>,
}

impl BroadcastTask {
    pub fn new(connection: Arc<Connection>, payload: Arc<str>) -> Self {
        Self {
            user_id: connection.user_id(),
            connection,
            payload,
        }
    }
}

/// Result of handing a task to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue full; the task is lost
    Dropped,
    /// Every worker has exited
    Closed,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

/// Counters since the dispatcher started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub enqueued: u64,
    /// Rejected because the queue was full
    pub dropped: u64,
    /// Rejected because the dispatcher had already stopped
    pub discarded: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Connections removed after reaching the write failure threshold
    pub evicted: u64,
}

pub struct Dispatcher {
    sender: mpsc::Sender<BroadcastTask>,
    overflow_policy: OverflowPolicy,
    counters: Arc<DispatchCounters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create the queue and spawn the worker pool on the current runtime
    pub fn start(
        config: &HubConfig,
        repository: Arc<dyn ConnectionRepository>,
        shutdown: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(DispatchCounters::default());
        let worker_count = config.worker_count.max(1);

        let workers = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    receiver: receiver.clone(),
                    repository: repository.clone(),
                    counters: counters.clone(),
                    write_timeout: config.write_timeout,
                    max_write_failures: config.max_write_failures,
                };
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect();

        tracing::info!(
            queue_capacity = config.queue_capacity.max(1),
            worker_count,
            overflow_policy = ?config.overflow_policy,
            "Broadcast dispatcher started"
        );

        Self {
            sender,
            overflow_policy: config.overflow_policy,
            counters,
            workers: Mutex::new(workers),
        }
    }

    /// Hand one task to the worker pool.
    ///
    /// With `DropNewest` this never awaits. Dropped tasks are logged and
    /// counted, never reported to the broadcast caller as an error.
    pub async fn enqueue(&self, task: BroadcastTask) -> EnqueueOutcome {
        let rejected = match self.overflow_policy {
            OverflowPolicy::DropNewest => match self.sender.try_send(task) {
                Ok(()) => None,
                Err(TrySendError::Full(task)) => Some((task, EnqueueOutcome::Dropped)),
                Err(TrySendError::Closed(task)) => Some((task, EnqueueOutcome::Closed)),
            },
            OverflowPolicy::Block { timeout } => match self.sender.send_timeout(task, timeout).await
            {
                Ok(()) => None,
                Err(SendTimeoutError::Timeout(task)) => Some((task, EnqueueOutcome::Dropped)),
                Err(SendTimeoutError::Closed(task)) => Some((task, EnqueueOutcome::Closed)),
            },
        };

        let Some((task, outcome)) = rejected else {
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            return EnqueueOutcome::Queued;
        };

        match outcome {
            EnqueueOutcome::Closed => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    college_id = %task.connection.tenant_id(),
                    user_id = %task.user_id,
                    "Dispatcher stopped, broadcast task discarded"
                );
            }
            _ => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    college_id = %task.connection.tenant_id(),
                    user_id = %task.user_id,
                    "Broadcast queue full, dropping task"
                );
            }
        }
        outcome
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    /// Tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Wait for every worker to exit (after the stop signal), up to `timeout`.
    ///
    /// Returns `false` if some worker was still running when time ran out.
    pub async fn join_workers(&self, timeout: Duration) -> bool {
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        let join_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Dispatch worker panicked: {}", e);
                }
            }
        };
        tokio::time::timeout(timeout, join_all).await.is_ok()
    }
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<BroadcastTask>>>,
    repository: Arc<dyn ConnectionRepository>,
    counters: Arc<DispatchCounters>,
    write_timeout: Duration,
    max_write_failures: u32,
}

impl Worker {
    async fn run(self, shutdown: CancellationToken) {
        tracing::debug!(worker_id = self.id, "Dispatch worker started");
        loop {
            let task = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                task = self.next_task() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.deliver(task) => {}
            }
        }
        tracing::debug!(worker_id = self.id, "Dispatch worker stopped");
    }

    async fn next_task(&self) -> Option<BroadcastTask> {
        self.receiver.lock().await.recv().await
    }

    /// Exactly one write attempt; never retried
    async fn deliver(&self, task: BroadcastTask) {
        let write = task.connection.send_text(task.payload.clone());
        let result = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.write_timeout.as_millis())),
        };

        match result {
            Ok(()) => {
                task.connection.record_write_success();
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.on_write_failure(&task, e).await,
        }
    }

    async fn on_write_failure(&self, task: &BroadcastTask, error: SinkError) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        let connection = &task.connection;
        let failures = connection.record_write_failure();
        tracing::warn!(
            worker_id = self.id,
            college_id = %connection.tenant_id(),
            user_id = %task.user_id,
            connection_id = %connection.id(),
            failures,
            "Failed to write broadcast: {}",
            error
        );

        if ConnectionHealth::from_failures(failures, self.max_write_failures)
            != ConnectionHealth::Dead
        {
            return;
        }

        let evicted = self
            .repository
            .unregister_connection(connection.tenant_id(), task.user_id, connection.id())
            .await;
        if evicted.is_none() {
            // Already replaced or removed by its read loop
            return;
        }

        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            college_id = %connection.tenant_id(),
            user_id = %task.user_id,
            connection_id = %connection.id(),
            "Evicting dead connection after {} consecutive write failures",
            failures
        );
        match tokio::time::timeout(self.write_timeout, connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Close after eviction failed: {}", e),
            Err(_) => tracing::debug!("Close after eviction timed out"),
        }
    }
}
