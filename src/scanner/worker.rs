//! Generic Scanner Worker loop (§4.5), parameterized over a [`ScannerBackend`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use super::{ScanOptions, ScannerBackend};
use crate::error::Error;
use crate::models::ScannerType;
use crate::queue::JobQueue;
use crate::scan_service::ScanService;

#[derive(Debug, Deserialize)]
struct RunArgs {
    scan_id: Uuid,
    target: String,
    #[serde(default)]
    options: ScanOptions,
}

pub struct ScannerWorker {
    scanner_type: ScannerType,
    backend: Arc<dyn ScannerBackend>,
    queue: JobQueue,
    scan_service: Arc<ScanService>,
    /// Configured default timeout (`SCAN_TIMEOUT_*`, §6.5) for this scanner
    /// type, used when a job's `options.timeout_secs` is absent. Falls back
    /// to the backend's own default if the caller has none configured.
    default_timeout: Duration,
}

impl ScannerWorker {
    pub fn new(
        scanner_type: ScannerType,
        backend: Arc<dyn ScannerBackend>,
        queue: JobQueue,
        scan_service: Arc<ScanService>,
        default_timeout: Duration,
    ) -> Self {
        Self { scanner_type, backend, queue, scan_service, default_timeout }
    }

    /// Run the worker loop until the process shuts down. Intended to be
    /// `tokio::spawn`ed once per scanner type.
    pub async fn run(self: Arc<Self>) {
        loop {
            let queue_name = self.scanner_type.queue_name();
            let Some(job) = self.queue.dequeue(&queue_name).await else {
                return; // queue closed, e.g. during test teardown
            };
            self.handle_job(&queue_name, job.id, &job.function, job.args).await;
        }
    }

    async fn handle_job(&self, queue_name: &str, _job_id: Uuid, function: &str, args: serde_json::Value) {
        let args: RunArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(error = %e, "malformed run_<scanner> job args, dropping");
                self.queue.ack_failure(queue_name, function).await;
                return;
            }
        };

        let timeout = args.options.timeout_secs.map(Duration::from_secs).unwrap_or(self.default_timeout);

        tracing::info!(scan_id = %args.scan_id, target = %args.target, scanner = %self.scanner_type, "running scanner");

        if let Err(e) = self.scan_service.mark_running(args.scan_id).await {
            tracing::warn!(scan_id = %args.scan_id, error = %e, "failed to mark scan running, continuing anyway");
        }

        let outcome = tokio::time::timeout(
            timeout,
            self.backend.run(args.scan_id, &args.target, &args.options),
        )
        .await;

        let result = match outcome {
            Ok(Ok(outcome)) => {
                let results = serde_json::to_value(&outcome).unwrap_or(serde_json::json!({}));
                ProcessResult::Completed(results)
            }
            Ok(Err(Error::ScannerParseFailed(msg))) => ProcessResult::Completed(serde_json::json!({
                "raw_output": serde_json::Value::Null,
                "parse_error": msg,
            })),
            Ok(Err(e)) => ProcessResult::Failed(e.to_string()),
            Err(_elapsed) => ProcessResult::Failed(Error::ScannerTimeout(timeout).to_string()),
        };

        let args_json = match &result {
            ProcessResult::Completed(results) => serde_json::json!({
                "scan_id": args.scan_id,
                "status": "completed",
                "results": results,
                "scanner": self.scanner_type.to_string(),
            }),
            ProcessResult::Failed(error) => serde_json::json!({
                "scan_id": args.scan_id,
                "status": "failed",
                "error": error,
                "scanner": self.scanner_type.to_string(),
            }),
        };

        match self.queue.enqueue("core", "process_scan_result", args_json).await {
            Ok(()) => self.queue.ack_success(queue_name, function).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to report scan result to core queue");
                self.queue.ack_failure(queue_name, function).await;
            }
        }
    }
}

enum ProcessResult {
    Completed(serde_json::Value),
    Failed(String),
}
