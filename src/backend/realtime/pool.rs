/**
 * Delivery Worker Pool
 *
 * Decouples message submission from live delivery. Sessions and the HTTP
 * send path `submit` jobs into one bounded queue; a fixed set of worker tasks
 * drains it, resolving each recipient through the `ConnectionRegistry`.
 *
 * # Backpressure
 *
 * `submit` never waits. When the queue is full the job is dropped, counted
 * and logged. Messages reach the pool only after they have been persisted, so
 * a drop costs the live push and nothing else: the recipient still sees the
 * message on the next history fetch. Jobs refused after `shutdown` are
 * counted and logged the same way.
 *
 * # Dispatch
 *
 * In `Immediate` mode a worker writes each job to the recipient straight
 * away. In `Batched` mode workers forward jobs to the `BatchScheduler`, which
 * flushes them in per-recipient groups.
 *
 * # Shutdown
 *
 * `shutdown` closes the queue and waits for every worker to drain what is
 * left. Workers hold the only senders into the batch scheduler, so once they
 * exit the scheduler flushes its last window and stops as well.
 */

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::batch::BatchScheduler;
use super::registry::ConnectionRegistry;
use crate::shared::{ChatMessage, UserId};

/// A persisted message waiting for live delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub message: ChatMessage,
}

impl Job {
    pub fn new(message: ChatMessage) -> Self {
        Self { message }
    }

    pub fn recipient(&self) -> UserId {
        self.message.recipient
    }
}

/// Why a job was refused by `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("delivery queue full, job dropped")]
    Backpressure,

    #[error("delivery pool is shut down")]
    ShutDown,
}

/// How workers hand off jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Immediate,
    Batched,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "batched" | "batch" => Ok(Self::Batched),
            other => Err(format!("unknown delivery mode '{}'", other)),
        }
    }
}

/// Sizing for the pool and its batch scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub mode: DeliveryMode,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 100,
            mode: DeliveryMode::Immediate,
            batch_size: 10,
            flush_interval: Duration::from_millis(50),
        }
    }
}

/// Delivery counters, shared by workers, the scheduler and `submit`
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    offline_skipped: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of `DeliveryStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub offline_skipped: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl DeliveryStats {
    pub(crate) fn record_delivered(&self, n: u64) {
        self.delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_offline(&self, n: u64) {
        self.offline_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            offline_skipped: self.offline_skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
enum Dispatch {
    Immediate,
    Batched(mpsc::Sender<Job>),
}

/// Fixed-size pool of delivery workers over one bounded queue
pub struct DeliveryWorkerPool {
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryWorkerPool {
    /// Spawn the workers (and the batch scheduler in batched mode)
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &DeliveryConfig, registry: ConnectionRegistry) -> Self {
        let stats = Arc::new(DeliveryStats::default());
        let (queue, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let (dispatch, scheduler) = match config.mode {
            DeliveryMode::Immediate => (Dispatch::Immediate, None),
            DeliveryMode::Batched => {
                let (jobs, task) = BatchScheduler::new(
                    registry.clone(),
                    stats.clone(),
                    config.batch_size,
                    config.flush_interval,
                )
                .spawn(config.queue_capacity.max(1));
                (Dispatch::Batched(jobs), Some(task))
            }
        };

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue_rx.clone(),
                    dispatch.clone(),
                    registry.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            mode = ?config.mode,
            "delivery worker pool started"
        );

        Self {
            queue: Mutex::new(Some(queue)),
            workers: Mutex::new(workers),
            scheduler: Mutex::new(scheduler),
            stats,
        }
    }

    /// Enqueue a job without waiting
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = queue.as_ref() else {
            return Err(self.refuse_after_shutdown(&job));
        };

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.stats.record_dropped();
                warn!(
                    sender = job.message.sender,
                    recipient = job.recipient(),
                    "delivery queue full, dropping live delivery"
                );
                Err(SubmitError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(job)) => Err(self.refuse_after_shutdown(&job)),
        }
    }

    fn refuse_after_shutdown(&self, job: &Job) -> SubmitError {
        self.stats.record_dropped();
        warn!(
            sender = job.message.sender,
            recipient = job.recipient(),
            "delivery pool shut down, dropping live delivery"
        );
        SubmitError::ShutDown
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Close the queue, then wait for workers and the scheduler to drain
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        let queue = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if queue.is_none() {
            return;
        }
        drop(queue);

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "delivery worker ended abnormally");
            }
        }

        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduler) = scheduler {
            if let Err(e) = scheduler.await {
                warn!(error = %e, "batch scheduler ended abnormally");
            }
        }

        let stats = self.stats.snapshot();
        info!(
            delivered = stats.delivered,
            offline_skipped = stats.offline_skipped,
            failed = stats.failed,
            dropped = stats.dropped,
            "delivery worker pool stopped"
        );
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    dispatch: Dispatch,
    registry: ConnectionRegistry,
    stats: Arc<DeliveryStats>,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        match &dispatch {
            Dispatch::Immediate => deliver(&registry, &stats, job).await,
            Dispatch::Batched(scheduler) => {
                if let Err(mpsc::error::SendError(job)) = scheduler.send(job).await {
                    // Scheduler is gone; fall back to a direct write
                    deliver(&registry, &stats, job).await;
                }
            }
        }
    }
    debug!(worker_id, "delivery worker exiting");
}

/// Write one message to its recipient's live connection, if any
pub(crate) async fn deliver(registry: &ConnectionRegistry, stats: &DeliveryStats, job: Job) {
    let recipient = job.recipient();
    let Some(handle) = registry.lookup(recipient).await else {
        stats.record_offline(1);
        debug!(recipient, "recipient offline, skipping live delivery");
        return;
    };

    let frame = match job.message.for_viewer(recipient).encode() {
        Ok(frame) => frame,
        Err(e) => {
            stats.record_failed(1);
            warn!(recipient, error = %e, "failed to encode message");
            return;
        }
    };

    match handle.send_text(frame) {
        Ok(()) => stats.record_delivered(1),
        Err(e) => {
            stats.record_failed(1);
            warn!(
                recipient,
                connection_id = %handle.id(),
                error = %e,
                "live delivery failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::realtime::connection::{ConnectionHandle, Frame};
    use assert_matches::assert_matches;

    fn config(workers: usize, queue_capacity: usize) -> DeliveryConfig {
        DeliveryConfig {
            workers,
            queue_capacity,
            ..DeliveryConfig::default()
        }
    }

    fn job(sender: UserId, recipient: UserId, content: &str) -> Job {
        Job::new(ChatMessage::new(sender, recipient, content))
    }

    #[test]
    fn test_delivery_mode_parsing() {
        assert_eq!("immediate".parse(), Ok(DeliveryMode::Immediate));
        assert_eq!(" Batched ".parse(), Ok(DeliveryMode::Batched));
        assert!("sometimes".parse::<DeliveryMode>().is_err());
    }

    #[tokio::test]
    async fn test_immediate_delivery_to_connected_recipient() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new(2, 8);
        registry.register(handle).await;

        let pool = DeliveryWorkerPool::start(&config(2, 8), registry);
        pool.submit(job(1, 2, "hi")).unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame delivered")
            .expect("channel open");
        let Frame::Text(text) = frame else {
            panic!("expected text frame, got {:?}", frame);
        };
        let message = ChatMessage::decode(&text).unwrap();
        assert_eq!((message.sender, message.recipient), (1, 2));
        assert_eq!(message.content, "hi");
        assert!(!message.session_flag);

        pool.shutdown().await;
        assert_eq!(pool.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_offline_recipient_is_skipped() {
        let pool = DeliveryWorkerPool::start(&config(1, 4), ConnectionRegistry::new());
        pool.submit(job(1, 9, "anyone there?")).unwrap();
        pool.shutdown().await;

        let stats = pool.stats();
        assert_eq!(stats.offline_skipped, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        // Single-threaded runtime: workers cannot run until this task yields
        let pool = DeliveryWorkerPool::start(&config(1, 2), ConnectionRegistry::new());

        let results: Vec<_> = (0..5).map(|i| pool.submit(job(1, 2, &i.to_string()))).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert_matches!(results[4], Err(SubmitError::Backpressure));

        pool.shutdown().await;
        let stats = pool.stats();
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.offline_skipped, 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_and_refuses_new_jobs() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new(2, 32);
        registry.register(handle).await;

        let pool = DeliveryWorkerPool::start(&config(3, 32), registry);
        for i in 0..10 {
            pool.submit(job(1, 2, &format!("m{}", i))).unwrap();
        }
        pool.shutdown().await;
        assert!(!pool.is_running());

        let mut received = 0;
        while let Ok(Frame::Text(_)) = rx.try_recv() {
            received += 1;
        }
        assert_eq!(received, 10);
        assert_eq!(pool.submit(job(1, 2, "late")), Err(SubmitError::ShutDown));
        assert_eq!(pool.stats().dropped, 1);

        // Idempotent
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_worker() {
        let registry = ConnectionRegistry::new();
        let (slow, _slow_rx) = ConnectionHandle::new(2, 1);
        let (fast, mut fast_rx) = ConnectionHandle::new(3, 8);
        registry.register(slow).await;
        registry.register(fast).await;

        let pool = DeliveryWorkerPool::start(&config(1, 8), registry);
        for content in ["a", "b", "c"] {
            pool.submit(job(1, 2, content)).unwrap();
        }
        pool.submit(job(1, 3, "still here")).unwrap();
        pool.shutdown().await;

        let stats = pool.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.failed, 2);
        assert_matches!(fast_rx.try_recv(), Ok(Frame::Text(text)) if text.contains("still here"));
    }
}
