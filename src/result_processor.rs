//! Result Processor (§4.3): consumes `process_scan_result` jobs off the
//! `core` queue and applies them via the Scan Service. Grounded on
//! `original_source/easm-core/app/tasks/scan_tasks.py::process_scan_result`
//! (the queue-based revision).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::scan_service::ScanService;

#[derive(Debug, Deserialize)]
struct ProcessResultArgs {
    scan_id: Uuid,
    status: String,
    #[serde(default)]
    results: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[allow(dead_code)]
    scanner: String,
}

pub struct ResultProcessor {
    scan_service: Arc<ScanService>,
}

impl ResultProcessor {
    pub fn new(scan_service: Arc<ScanService>) -> Self {
        Self { scan_service }
    }

    /// Handle one `process_scan_result` job. At-least-once safe: applying
    /// the same completion twice is a no-op on the second delivery because
    /// `ScanService::complete_scan`/`fail_scan` gate on the scan already
    /// being terminal.
    pub async fn handle(&self, args: Value) -> Result<(), Error> {
        let args: ProcessResultArgs = serde_json::from_value(args)
            .map_err(|e| Error::IllegalTransition(format!("malformed process_scan_result payload: {e}")))?;

        match args.status.as_str() {
            "completed" => {
                let results = args.results.unwrap_or(serde_json::json!({}));
                self.scan_service.complete_scan(args.scan_id, results).await
            }
            "failed" => {
                let error = args.error.unwrap_or_else(|| "unknown error".to_string());
                self.scan_service.fail_scan(args.scan_id, error).await
            }
            other => {
                // An unrecognized status must not poison the queue with
                // infinite redelivery: log and drop.
                tracing::error!(scan_id = %args.scan_id, status = other, "unknown process_scan_result status, dropping");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScannerType;
    use crate::store::MemoryStore;

    fn processor() -> (ResultProcessor, Arc<ScanService>) {
        let scan_service = Arc::new(ScanService::new(Arc::new(MemoryStore::new()), 30));
        (ResultProcessor::new(scan_service.clone()), scan_service)
    }

    #[tokio::test]
    async fn applies_completed_result() {
        let (processor, scan_service) = processor();
        let scan = scan_service
            .create_scan("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap();

        processor
            .handle(serde_json::json!({
                "scan_id": scan.id,
                "status": "completed",
                "results": {"open_ports": [22], "services": {"22": {"name": "ssh"}}},
                "scanner": "port-fast",
            }))
            .await
            .unwrap();

        let view = scan_service.get_scan_view(scan.id).await.unwrap();
        assert_eq!(view.findings.len(), 1);
    }

    #[tokio::test]
    async fn redelivery_of_completed_result_is_idempotent() {
        let (processor, scan_service) = processor();
        let scan = scan_service
            .create_scan("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap();

        let job = serde_json::json!({
            "scan_id": scan.id,
            "status": "completed",
            "results": {"open_ports": [22]},
            "scanner": "port-fast",
        });

        processor.handle(job.clone()).await.unwrap();
        processor.handle(job).await.unwrap();

        let view = scan_service.get_scan_view(scan.id).await.unwrap();
        assert_eq!(view.findings.len(), 1, "redelivery must not duplicate findings");
    }

    #[tokio::test]
    async fn applies_failed_result() {
        let (processor, scan_service) = processor();
        let scan = scan_service
            .create_scan("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap();

        processor
            .handle(serde_json::json!({
                "scan_id": scan.id,
                "status": "failed",
                "error": "timeout",
                "scanner": "port-fast",
            }))
            .await
            .unwrap();

        let view = scan_service.get_scan_view(scan.id).await.unwrap();
        assert_eq!(view.scan.error_message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn unknown_status_is_dropped_not_errored() {
        let (processor, scan_service) = processor();
        let scan = scan_service
            .create_scan("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap();

        processor
            .handle(serde_json::json!({"scan_id": scan.id, "status": "weird", "scanner": "port-fast"}))
            .await
            .unwrap();
    }
}
