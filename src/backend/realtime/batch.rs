/**
 * Batch Scheduler
 *
 * Collects delivery jobs into a window and flushes the window either when it
 * reaches `batch_size` jobs or when the flush timer fires with a non-empty
 * batch, whichever comes first.
 *
 * On flush each recipient is resolved on its own. A recipient receives one
 * frame holding only the messages addressed to it, as a JSON array, in
 * submission order. Recipients with no live connection are skipped; their
 * messages are already in the store.
 */

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::pool::{DeliveryStats, Job};
use super::registry::ConnectionRegistry;
use crate::shared::{encode_batch, ChatMessage, UserId};

/// Ordered window of jobs awaiting flush
#[derive(Debug, Default)]
pub struct Batch {
    jobs: Vec<Job>,
    threshold: usize,
}

impl Batch {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            jobs: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Append a job; returns `true` once the size threshold is reached
    pub fn push(&mut self, job: Job) -> bool {
        self.jobs.push(job);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Take the current window, leaving an empty batch behind
    pub fn take(&mut self) -> Vec<Job> {
        std::mem::replace(&mut self.jobs, Vec::with_capacity(self.threshold))
    }
}

/// Group jobs by recipient
///
/// Recipients appear in order of their first job, and each recipient's
/// messages keep submission order.
pub fn split_by_recipient(jobs: Vec<Job>) -> Vec<(UserId, Vec<ChatMessage>)> {
    let mut groups: Vec<(UserId, Vec<ChatMessage>)> = Vec::new();
    for job in jobs {
        let recipient = job.recipient();
        match groups.iter_mut().find(|(id, _)| *id == recipient) {
            Some((_, messages)) => messages.push(job.message),
            None => groups.push((recipient, vec![job.message])),
        }
    }
    groups
}

/// Size/timer driven flusher fed by the delivery workers
pub struct BatchScheduler {
    registry: ConnectionRegistry,
    stats: Arc<DeliveryStats>,
    batch_size: usize,
    flush_interval: Duration,
}

impl BatchScheduler {
    pub fn new(
        registry: ConnectionRegistry,
        stats: Arc<DeliveryStats>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            registry,
            stats,
            batch_size,
            flush_interval,
        }
    }

    /// Run the scheduler on its own task
    ///
    /// The scheduler stops after every returned sender (and its clones) has
    /// been dropped, flushing whatever is still pending.
    pub fn spawn(self, capacity: usize) -> (mpsc::Sender<Job>, JoinHandle<()>) {
        let (jobs, jobs_rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(self.run(jobs_rx));
        (jobs, task)
    }

    async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        let mut batch = Batch::new(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => {
                        if batch.push(job) {
                            self.flush(batch.take()).await;
                            ticker.reset();
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            self.flush(batch.take()).await;
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(batch.take()).await;
                    }
                }
            }
        }
        debug!("batch scheduler stopped");
    }

    async fn flush(&self, jobs: Vec<Job>) {
        let total = jobs.len();
        let groups = split_by_recipient(jobs);
        debug!(jobs = total, recipients = groups.len(), "flushing batch");

        for (recipient, messages) in groups {
            let count = messages.len() as u64;
            let Some(handle) = self.registry.lookup(recipient).await else {
                self.stats.record_offline(count);
                debug!(recipient, count, "recipient offline, skipping batch slice");
                continue;
            };

            let messages: Vec<ChatMessage> = messages
                .into_iter()
                .map(|m| m.for_viewer(recipient))
                .collect();
            let frame = match encode_batch(&messages) {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.record_failed(count);
                    warn!(recipient, error = %e, "failed to encode batch");
                    continue;
                }
            };

            match handle.send_text(frame) {
                Ok(()) => self.stats.record_delivered(count),
                Err(e) => {
                    self.stats.record_failed(count);
                    warn!(
                        recipient,
                        connection_id = %handle.id(),
                        error = %e,
                        "batch delivery failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::realtime::connection::{ConnectionHandle, Frame};
    use pretty_assertions::assert_eq;

    fn job(recipient: UserId, content: &str) -> Job {
        Job::new(ChatMessage::new(1, recipient, content))
    }

    fn contents(frame: Frame) -> Vec<String> {
        let Frame::Text(text) = frame else {
            panic!("expected text frame, got {:?}", frame);
        };
        let messages: Vec<ChatMessage> = serde_json::from_str(&text).unwrap();
        messages.into_iter().map(|m| m.content).collect()
    }

    fn scheduler(
        registry: &ConnectionRegistry,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (mpsc::Sender<Job>, JoinHandle<()>, Arc<DeliveryStats>) {
        let stats = Arc::new(DeliveryStats::default());
        let (tx, task) =
            BatchScheduler::new(registry.clone(), stats.clone(), batch_size, flush_interval)
                .spawn(16);
        (tx, task, stats)
    }

    #[test]
    fn test_batch_reports_full_at_threshold() {
        let mut batch = Batch::new(2);
        assert!(!batch.push(job(2, "a")));
        assert!(batch.push(job(2, "b")));
        assert_eq!(batch.take().len(), 2);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_split_preserves_order_per_recipient() {
        let groups = split_by_recipient(vec![job(2, "a"), job(3, "b"), job(2, "c"), job(4, "d")]);
        let summary: Vec<(UserId, Vec<&str>)> = groups
            .iter()
            .map(|(r, ms)| (*r, ms.iter().map(|m| m.content.as_str()).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![(2, vec!["a", "c"]), (3, vec!["b"]), (4, vec!["d"])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_when_threshold_reached() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new(2, 8);
        registry.register(handle).await;
        let (tx, _task, stats) = scheduler(&registry, 3, Duration::from_secs(3600));

        for content in ["one", "two", "three"] {
            tx.send(job(2, content)).await.unwrap();
        }
        let frame = rx.recv().await.unwrap();
        assert_eq!(contents(frame), vec!["one", "two", "three"]);
        assert_eq!(stats.snapshot().delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_partial_batch_on_timer() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new(2, 8);
        registry.register(handle).await;
        let (tx, _task, _stats) = scheduler(&registry, 10, Duration::from_millis(50));

        tx.send(job(2, "lonely")).await.unwrap();
        assert!(rx.try_recv().is_err());

        let frame = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("timer flush")
            .unwrap();
        assert_eq!(contents(frame), vec!["lonely"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_recipient_gets_only_its_slice() {
        let registry = ConnectionRegistry::new();
        let (bob, mut bob_rx) = ConnectionHandle::new(2, 8);
        let (carol, mut carol_rx) = ConnectionHandle::new(3, 8);
        registry.register(bob).await;
        registry.register(carol).await;
        let (tx, task, _stats) = scheduler(&registry, 10, Duration::from_secs(3600));

        for (recipient, content) in [(2, "b1"), (3, "c1"), (2, "b2")] {
            tx.send(job(recipient, content)).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();

        assert_eq!(contents(bob_rx.recv().await.unwrap()), vec!["b1", "b2"]);
        assert_eq!(contents(carol_rx.recv().await.unwrap()), vec!["c1"]);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_recipients_are_skipped() {
        let registry = ConnectionRegistry::new();
        let (tx, task, stats) = scheduler(&registry, 2, Duration::from_secs(3600));

        tx.send(job(9, "x")).await.unwrap();
        tx.send(job(9, "y")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let stats = stats.snapshot();
        assert_eq!(stats.offline_skipped, 2);
        assert_eq!(stats.delivered, 0);
    }
}
