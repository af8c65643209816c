//! Scan Service (§4.1): sole mutator of the Scan Store; owns the scan state
//! machine and the derivation of Findings/Asset/RiskScore on completion.
//! Grounded on the teacher's `api::scan` handlers' shape, generalized from
//! direct DB access behind the `ScanStore` trait.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Asset, Finding, FindingType, RiskScore, Scan, ScannerType, Severity};
use crate::risk;
use crate::scanner::ScanOptions;
use crate::store::ScanStore;
use crate::validation;

pub struct ScanService {
    store: Arc<dyn ScanStore>,
    risk_score_ttl_days: i64,
}

/// Everything `GET /api/v1/scan/{scan_id}` returns for a completed scan.
#[derive(Debug)]
pub struct ScanView {
    pub scan: Scan,
    pub findings: Vec<Finding>,
    pub risk_score: Option<RiskScore>,
}

impl ScanService {
    pub fn new(store: Arc<dyn ScanStore>, risk_score_ttl_days: i64) -> Self {
        Self { store, risk_score_ttl_days }
    }

    pub async fn create_scan(&self, target: String, scanner: ScannerType, options: Value) -> Result<Scan, Error> {
        validation::validate_target(&target)?;
        validate_options(&options)?;
        let scan = Scan::new(target, scanner, options);
        self.store.insert_scan(scan.clone()).await?;
        Ok(scan)
    }

    pub async fn get_scan_view(&self, scan_id: Uuid) -> Result<ScanView, Error> {
        let scan = self.store.get_scan(scan_id).await?.ok_or(Error::NotFound(scan_id))?;

        if scan.status != crate::models::ScanStatus::Completed {
            return Ok(ScanView { scan, findings: Vec::new(), risk_score: None });
        }

        let findings = self.store.list_findings(scan_id).await?;
        let risk_score = self.store.get_risk_score(&scan.target).await?;
        Ok(ScanView { scan, findings, risk_score })
    }

    pub async fn mark_running(&self, scan_id: Uuid) -> Result<(), Error> {
        self.store.mark_running(scan_id).await
    }

    /// Transition a scan to `completed`, deriving Findings from `results`,
    /// upserting the Asset, and recomputing the RiskScore for the target.
    /// Idempotent: a scan already in a terminal state is left untouched
    /// (§4.3, P5).
    pub async fn complete_scan(&self, scan_id: Uuid, results: Value) -> Result<(), Error> {
        let scan = self.store.get_scan(scan_id).await?.ok_or(Error::NotFound(scan_id))?;
        if scan.status.is_terminal() {
            tracing::debug!(scan_id = %scan_id, "complete_scan: already terminal, no-op");
            return Ok(());
        }

        let findings = derive_findings(scan_id, &scan.target, &results);
        let assessment = risk::assess(&findings);
        let now = Utc::now();

        let asset = Asset {
            id: Uuid::new_v4(),
            target: scan.target.clone(),
            asset_type: validation::classify_target(&scan.target),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
        };

        let risk_score = RiskScore {
            id: Uuid::new_v4(),
            target: scan.target.clone(),
            score: assessment.score,
            level: assessment.level,
            factors: assessment.factors,
            calculated_at: now,
            expires_at: now + ChronoDuration::days(self.risk_score_ttl_days),
        };

        self.store
            .complete_scan(scan_id, results, findings, asset, risk_score)
            .await
    }

    /// Transition a scan to `failed`. Idempotent like `complete_scan`.
    pub async fn fail_scan(&self, scan_id: Uuid, error_message: String) -> Result<(), Error> {
        self.store.fail_scan(scan_id, error_message).await
    }

    pub async fn health(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

/// Validate `options` against the scanner option schema (§6.4): unknown
/// keys and type mismatches are rejected at the ingress boundary rather than
/// surfacing later as a malformed `run_<scanner>` job the worker can't
/// deserialize.
fn validate_options(options: &Value) -> Result<(), Error> {
    let options = if options.is_null() { serde_json::json!({}) } else { options.clone() };
    serde_json::from_value::<ScanOptions>(options)
        .map(|_| ())
        .map_err(|e| Error::InvalidOptions(e.to_string()))
}

/// Derive Findings from a scanner's normalized result payload (§4.3).
/// Mirrors `original_source/.../services/scan_service_new.py::_process_scan_results`.
fn derive_findings(scan_id: Uuid, target: &str, results: &Value) -> Vec<Finding> {
    let mut findings = Vec::new();
    let now = Utc::now();

    let open_ports: Vec<u16> = results
        .get("open_ports")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|p| p.as_u64()).map(|p| p as u16).collect())
        .unwrap_or_default();

    let services = results.get("services");

    for port in open_ports {
        let service_name = services
            .and_then(|s| s.get(port.to_string()))
            .and_then(|si| si.get("name"))
            .and_then(|n| n.as_str());

        let description = match service_name {
            Some(name) => format!("Port {port} is open and running {name}"),
            None => format!("Port {port} is open"),
        };

        findings.push(Finding {
            id: Uuid::new_v4(),
            scan_id,
            target: target.to_string(),
            finding_type: FindingType::OpenPort,
            severity: Severity::Medium,
            title: format!("Open port {port}"),
            description,
            port: Some(port),
            service: service_name.map(str::to_string),
            metadata: serde_json::json!({}),
            created_at: now,
            verified: true,
        });
    }

    if let Some(vulns) = results.get("vulnerabilities").and_then(|v| v.as_array()) {
        for vuln in vulns {
            let severity = vuln
                .get("severity")
                .and_then(|s| s.as_str())
                .and_then(|s| s.parse::<Severity>().ok())
                .unwrap_or(Severity::Low);

            findings.push(Finding {
                id: Uuid::new_v4(),
                scan_id,
                target: target.to_string(),
                finding_type: FindingType::Vulnerability,
                severity,
                title: vuln.get("name").and_then(|n| n.as_str()).unwrap_or("Vulnerability").to_string(),
                description: vuln.get("description").and_then(|d| d.as_str()).unwrap_or("").to_string(),
                port: None,
                service: None,
                metadata: vuln.clone(),
                created_at: now,
                verified: true,
            });
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> ScanService {
        ScanService::new(Arc::new(MemoryStore::new()), 30)
    }

    #[tokio::test]
    async fn create_scan_rejects_invalid_target() {
        let svc = service();
        let err = svc
            .create_scan("not a host!!".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget(_)));
    }

    #[tokio::test]
    async fn create_scan_rejects_unknown_option_keys() {
        let svc = service();
        let err = svc
            .create_scan(
                "192.0.2.10".to_string(),
                ScannerType::PortFast,
                serde_json::json!({"bogus": 1}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn create_scan_accepts_known_option_keys() {
        let svc = service();
        svc.create_scan(
            "192.0.2.10".to_string(),
            ScannerType::PortFast,
            serde_json::json!({"ports": "22,80", "timeout_secs": 5}),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn complete_scan_derives_findings_and_risk_score() {
        let svc = service();
        let scan = svc
            .create_scan("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap();

        let results = serde_json::json!({
            "open_ports": [22, 80],
            "services": {"22": {"name": "ssh"}, "80": {"name": "http"}},
        });
        svc.complete_scan(scan.id, results).await.unwrap();

        let view = svc.get_scan_view(scan.id).await.unwrap();
        assert_eq!(view.findings.len(), 2);
        assert!(view.findings.iter().all(|f| f.finding_type == FindingType::OpenPort));
        let risk_score = view.risk_score.unwrap();
        assert_eq!(risk_score.score, 11);
        assert_eq!(risk_score.level, "info");
    }

    #[tokio::test]
    async fn fail_scan_sets_error_message() {
        let svc = service();
        let scan = svc
            .create_scan("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}))
            .await
            .unwrap();

        svc.fail_scan(scan.id, "timeout".to_string()).await.unwrap();
        let view = svc.get_scan_view(scan.id).await.unwrap();
        assert_eq!(view.scan.error_message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn get_scan_view_errors_for_unknown_scan() {
        let svc = service();
        let err = svc.get_scan_view(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
