//! In-process job queue.
//!
//! Named queues of [`Job`] envelopes, delivered at-least-once to whichever
//! worker pool calls [`JobQueue::dequeue`] next. Modeled on the teacher's
//! `db::write_buffer` mpsc-channel-plus-background-task pattern, generalized
//! from a single hardcoded sink into a broker of arbitrarily many named
//! queues with delivery/outcome counters.

mod retry;

pub use retry::{RetryPolicy, retry_with_backoff};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::error::Error;

/// How many jobs a single named queue buffers before `enqueue` starts
/// reporting backpressure as a transient `QueueUnavailable` error.
const QUEUE_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub function: String,
    pub args: Value,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FunctionCounters {
    pub delivered: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub oldest_job_age_secs: Option<i64>,
    pub in_flight: usize,
    pub by_function: HashMap<String, FunctionCounters>,
}

struct QueueInner {
    tx: mpsc::Sender<Job>,
    rx: Mutex<mpsc::Receiver<Job>>,
    pending: Mutex<Vec<DateTime<Utc>>>,
    in_flight: std::sync::atomic::AtomicUsize,
    counters: Mutex<HashMap<String, FunctionCounters>>,
}

impl QueueInner {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: Mutex::new(Vec::new()),
            in_flight: std::sync::atomic::AtomicUsize::new(0),
            counters: Mutex::new(HashMap::new()),
        }
    }
}

/// A broker of named, at-least-once job queues backed by `tokio::mpsc`
/// channels. Queues are created lazily on first use.
#[derive(Clone, Default)]
pub struct JobQueue {
    queues: Arc<Mutex<HashMap<String, Arc<QueueInner>>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn queue(&self, name: &str) -> Arc<QueueInner> {
        let mut queues = self.queues.lock().await;
        queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(QueueInner::new()))
            .clone()
    }

    /// Enqueue a job, retrying with the default exponential backoff policy
    /// on transient backpressure (§4.6).
    pub async fn enqueue(&self, queue_name: &str, function: &str, args: Value) -> Result<(), Error> {
        let policy = RetryPolicy::default_policy();
        retry_with_backoff(&policy, || {
            let queue_name = queue_name.to_string();
            let function = function.to_string();
            let args = args.clone();
            async move { self.try_enqueue(&queue_name, &function, args).await }
        })
        .await
    }

    async fn try_enqueue(&self, queue_name: &str, function: &str, args: Value) -> Result<(), Error> {
        let queue = self.queue(queue_name).await;
        let job = Job {
            id: Uuid::new_v4(),
            function: function.to_string(),
            args,
            enqueued_at: Utc::now(),
        };

        match queue.tx.try_send(job) {
            Ok(()) => {
                queue.pending.lock().await.push(Utc::now());
                tracing::debug!(queue = queue_name, function, "enqueued job");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueUnavailable(format!(
                "queue '{queue_name}' is at capacity"
            ))),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::QueueUnavailable(format!(
                "queue '{queue_name}' is closed"
            ))),
        }
    }

    /// Dequeue the next job for the given queue, blocking until one is
    /// available. Marks the job as delivered and in-flight for stats.
    pub async fn dequeue(&self, queue_name: &str) -> Option<Job> {
        let queue = self.queue(queue_name).await;
        let job = {
            let mut rx = queue.rx.lock().await;
            rx.recv().await
        }?;

        {
            let mut pending = queue.pending.lock().await;
            if !pending.is_empty() {
                pending.remove(0);
            }
        }
        queue
            .in_flight
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut counters = queue.counters.lock().await;
        counters.entry(job.function.clone()).or_default().delivered += 1;

        Some(job)
    }

    /// Record that a dequeued job finished successfully.
    pub async fn ack_success(&self, queue_name: &str, function: &str) {
        let queue = self.queue(queue_name).await;
        queue
            .in_flight
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        queue.counters.lock().await.entry(function.to_string()).or_default().succeeded += 1;
    }

    /// Record that a dequeued job failed terminally (not retried).
    pub async fn ack_failure(&self, queue_name: &str, function: &str) {
        let queue = self.queue(queue_name).await;
        queue
            .in_flight
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        queue.counters.lock().await.entry(function.to_string()).or_default().failed += 1;
    }

    /// Record that a dequeued job is being retried rather than acked. The
    /// job stays in flight — it hasn't been handed back to `dequeue` and
    /// will be re-run by the same caller — so `in_flight` is left alone;
    /// only the terminal `ack_success`/`ack_failure` that eventually
    /// follows should release it.
    pub async fn ack_retry(&self, queue_name: &str, function: &str) {
        let queue = self.queue(queue_name).await;
        queue.counters.lock().await.entry(function.to_string()).or_default().retried += 1;
    }

    pub async fn stats(&self, queue_name: &str) -> QueueStats {
        let queue = self.queue(queue_name).await;
        let pending = queue.pending.lock().await;
        let oldest_job_age_secs = pending
            .first()
            .map(|ts| (Utc::now() - *ts).num_seconds());

        QueueStats {
            depth: pending.len(),
            oldest_job_age_secs,
            in_flight: queue.in_flight.load(std::sync::atomic::Ordering::SeqCst),
            by_function: queue.counters.lock().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let q = JobQueue::new();
        q.enqueue("core", "scan_asset", serde_json::json!({"x": 1}))
            .await
            .unwrap();

        let job = q.dequeue("core").await.unwrap();
        assert_eq!(job.function, "scan_asset");
        assert_eq!(job.args["x"], 1);
    }

    #[tokio::test]
    async fn stats_track_depth_and_in_flight() {
        let q = JobQueue::new();
        q.enqueue("core", "scan_asset", serde_json::json!({})).await.unwrap();
        let stats = q.stats("core").await;
        assert_eq!(stats.depth, 1);
        assert_eq!(stats.in_flight, 0);

        let job = q.dequeue("core").await.unwrap();
        let stats = q.stats("core").await;
        assert_eq!(stats.depth, 0);
        assert_eq!(stats.in_flight, 1);

        q.ack_success("core", &job.function).await;
        let stats = q.stats("core").await;
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.by_function["scan_asset"].delivered, 1);
        assert_eq!(stats.by_function["scan_asset"].succeeded, 1);
    }

    #[tokio::test]
    async fn distinct_queues_are_independent() {
        let q = JobQueue::new();
        q.enqueue("core", "scan_asset", serde_json::json!({})).await.unwrap();
        assert!(q.stats("scanner-port-fast").await.depth == 0);
    }

    /// A job retried one or more times before finally settling must leave
    /// `in_flight` decremented exactly once overall — not once per retry
    /// plus once on the terminal ack.
    #[tokio::test]
    async fn retry_then_settle_decrements_in_flight_exactly_once() {
        let q = JobQueue::new();
        q.enqueue("core", "scan_asset", serde_json::json!({})).await.unwrap();
        let job = q.dequeue("core").await.unwrap();
        assert_eq!(q.stats("core").await.in_flight, 1);

        q.ack_retry("core", &job.function).await;
        q.ack_retry("core", &job.function).await;
        assert_eq!(q.stats("core").await.in_flight, 1, "retries must not release in_flight");

        q.ack_success("core", &job.function).await;
        let stats = q.stats("core").await;
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.by_function["scan_asset"].retried, 2);
        assert_eq!(stats.by_function["scan_asset"].succeeded, 1);
    }
}
