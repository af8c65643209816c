//! Dispatcher (§4.2): consumes `scan_asset` jobs off the `core` queue and
//! routes them to the scanner-type-specific queue. Grounded on
//! `original_source/easm-core/app/tasks/scan_tasks.py::scan_asset` (the
//! queue-based revision; the HTTP-callback revision is dead code, §9).

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::models::ScannerType;
use crate::queue::JobQueue;
use crate::validation;

#[derive(Debug, Deserialize)]
struct ScanAssetArgs {
    scan_id: Uuid,
    payload: ScanAssetPayload,
}

#[derive(Debug, Deserialize)]
struct ScanAssetPayload {
    target: String,
    scanner: String,
    #[serde(default)]
    options: Value,
}

pub struct Dispatcher {
    queue: JobQueue,
}

impl Dispatcher {
    pub fn new(queue: JobQueue) -> Self {
        Self { queue }
    }

    /// Handle one `scan_asset` job. Returns `Err` only for failures the
    /// caller should treat as a processing error (transient queue
    /// unavailability); validation failures are reported onto the Scan via
    /// `process_scan_result` and return `Ok`, per §4.2 step 1.
    pub async fn handle(&self, args: Value) -> Result<(), Error> {
        let args: ScanAssetArgs = serde_json::from_value(args)
            .map_err(|e| Error::IllegalTransition(format!("malformed scan_asset payload: {e}")))?;

        if let Err(e) = validation::validate_target(&args.payload.target) {
            tracing::warn!(scan_id = %args.scan_id, error = %e, "dispatcher: invalid target");
            return self.report_failure(args.scan_id, e.to_string()).await;
        }

        let scanner = match args.payload.scanner.parse::<ScannerType>() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(scan_id = %args.scan_id, error = %e, "dispatcher: unsupported scanner");
                return self.report_failure(args.scan_id, e.to_string()).await;
            }
        };

        let run_args = serde_json::json!({
            "scan_id": args.scan_id,
            "target": args.payload.target,
            "options": args.payload.options,
        });

        self.queue
            .enqueue(&scanner.queue_name(), &scanner.job_function(), run_args)
            .await?;

        tracing::info!(scan_id = %args.scan_id, scanner = %scanner, "dispatched scan");
        Ok(())
    }

    async fn report_failure(&self, scan_id: Uuid, error: String) -> Result<(), Error> {
        let args = serde_json::json!({
            "scan_id": scan_id,
            "status": "failed",
            "error": error,
            "scanner": "core",
        });
        self.queue.enqueue("core", "process_scan_result", args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_valid_scan_asset_to_scanner_queue() {
        let queue = JobQueue::new();
        let dispatcher = Dispatcher::new(queue.clone());
        let scan_id = Uuid::new_v4();

        dispatcher
            .handle(serde_json::json!({
                "scan_id": scan_id,
                "payload": {"target": "192.0.2.10", "scanner": "port-fast", "options": {}}
            }))
            .await
            .unwrap();

        let job = queue.dequeue("scanner-port-fast").await.unwrap();
        assert_eq!(job.function, "run_port-fast");
        assert_eq!(job.args["scan_id"], serde_json::json!(scan_id));
    }

    #[tokio::test]
    async fn invalid_target_reports_failure_instead_of_dispatching() {
        let queue = JobQueue::new();
        let dispatcher = Dispatcher::new(queue.clone());
        let scan_id = Uuid::new_v4();

        dispatcher
            .handle(serde_json::json!({
                "scan_id": scan_id,
                "payload": {"target": "not a host!!", "scanner": "port-fast", "options": {}}
            }))
            .await
            .unwrap();

        assert_eq!(queue.stats("scanner-port-fast").await.depth, 0);
        let job = queue.dequeue("core").await.unwrap();
        assert_eq!(job.function, "process_scan_result");
        assert_eq!(job.args["status"], "failed");
    }

    #[tokio::test]
    async fn unsupported_scanner_reports_failure() {
        let queue = JobQueue::new();
        let dispatcher = Dispatcher::new(queue.clone());
        let scan_id = Uuid::new_v4();

        dispatcher
            .handle(serde_json::json!({
                "scan_id": scan_id,
                "payload": {"target": "192.0.2.10", "scanner": "nope", "options": {}}
            }))
            .await
            .unwrap();

        let job = queue.dequeue("core").await.unwrap();
        assert_eq!(job.args["status"], "failed");
    }
}
