//! The `core` queue has two job functions multiplexed onto it — `scan_asset`
//! (handled by the Dispatcher) and `process_scan_result` (handled by the
//! Result Processor) — mirroring how the original ARQ worker registers both
//! task functions against a single queue/worker process.

use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::queue::{JobQueue, RetryPolicy};
use crate::result_processor::ResultProcessor;

/// Per-job deadline for `core` queue jobs (§4.6, §5).
const CORE_JOB_TIMEOUT: Duration = Duration::from_secs(300);

pub struct CoreWorker {
    queue: JobQueue,
    dispatcher: Dispatcher,
    result_processor: ResultProcessor,
}

impl CoreWorker {
    pub fn new(queue: JobQueue, dispatcher: Dispatcher, result_processor: ResultProcessor) -> Self {
        Self { queue, dispatcher, result_processor }
    }

    pub async fn run(self: Arc<Self>) {
        loop {
            let Some(job) = self.queue.dequeue("core").await else {
                return;
            };

            let policy = RetryPolicy::default_policy();
            let mut backoff = policy.initial_backoff;
            let mut attempt = 1;

            loop {
                let handler = async {
                    match job.function.as_str() {
                        "scan_asset" => self.dispatcher.handle(job.args.clone()).await,
                        "process_scan_result" => self.result_processor.handle(job.args.clone()).await,
                        other => {
                            tracing::error!(function = other, "unknown core job function, dropping");
                            Ok(())
                        }
                    }
                };

                let outcome = match tokio::time::timeout(CORE_JOB_TIMEOUT, handler).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => {
                        tracing::error!(function = %job.function, timeout = ?CORE_JOB_TIMEOUT, "core job deadline exceeded");
                        self.queue.ack_failure("core", &job.function).await;
                        break;
                    }
                };

                match outcome {
                    Ok(()) => {
                        self.queue.ack_success("core", &job.function).await;
                        break;
                    }
                    Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                        tracing::warn!(error = %e, function = %job.function, attempt, "core job failed transiently, retrying");
                        self.queue.ack_retry("core", &job.function).await;
                        tokio::time::sleep(backoff).await;
                        backoff *= policy.factor;
                        attempt += 1;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, function = %job.function, "core job failed");
                        self.queue.ack_failure("core", &job.function).await;
                        break;
                    }
                }
            }
        }
    }
}
