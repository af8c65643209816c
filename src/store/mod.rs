//! Scan Store: durable persistence of Scans, Findings, Assets, and
//! RiskScores, behind a trait so the in-memory implementation can back tests
//! without a live database.

pub mod memory;
pub mod postgres;

#[allow(unused_imports)]
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{Asset, Finding, RiskScore, Scan};

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn insert_scan(&self, scan: Scan) -> Result<(), Error>;
    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, Error>;

    /// Atomically transition a scan to `running`, setting `started_at`.
    /// No-op if the scan is already terminal or already running.
    async fn mark_running(&self, scan_id: Uuid) -> Result<(), Error>;

    /// Atomically complete a scan: set status/results/completed_at, insert
    /// the given Findings, upsert the Asset, and replace the RiskScore for
    /// the target. No-op if the scan is already terminal (idempotency, §4.3).
    async fn complete_scan(
        &self,
        scan_id: Uuid,
        results: serde_json::Value,
        findings: Vec<Finding>,
        asset: Asset,
        risk_score: RiskScore,
    ) -> Result<(), Error>;

    /// Atomically fail a scan. No-op if the scan is already terminal.
    async fn fail_scan(&self, scan_id: Uuid, error_message: String) -> Result<(), Error>;

    async fn list_findings(&self, scan_id: Uuid) -> Result<Vec<Finding>, Error>;
    async fn get_risk_score(&self, target: &str) -> Result<Option<RiskScore>, Error>;

    /// Liveness probe used by `GET /health`.
    async fn ping(&self) -> Result<(), Error>;
}

#[cfg(test)]
mod contract_tests {
    //! Shared behavioral contract every `ScanStore` implementation must
    //! satisfy, exercised here against `MemoryStore`.
    use super::*;
    use crate::models::{AssetType, FindingType, ScanStatus, ScannerType, Severity};
    use chrono::Utc;

    fn sample_finding(scan_id: Uuid, target: &str) -> Finding {
        Finding {
            id: Uuid::new_v4(),
            scan_id,
            target: target.to_string(),
            finding_type: FindingType::OpenPort,
            severity: Severity::Medium,
            title: "Open port 22".to_string(),
            description: "Port 22 is open and running ssh".to_string(),
            port: Some(22),
            service: Some("ssh".to_string()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            verified: true,
        }
    }

    fn sample_asset(target: &str) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            target: target.to_string(),
            asset_type: AssetType::Ip,
            status: "active".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    fn sample_risk_score(target: &str) -> RiskScore {
        RiskScore {
            id: Uuid::new_v4(),
            target: target.to_string(),
            score: 11,
            level: "info".to_string(),
            factors: Default::default(),
            calculated_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
        }
    }

    #[tokio::test]
    async fn complete_scan_is_idempotent() {
        let store = MemoryStore::new();
        let scan = Scan::new("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}));
        let scan_id = scan.id;
        store.insert_scan(scan).await.unwrap();

        let findings = vec![sample_finding(scan_id, "192.0.2.10")];
        let asset = sample_asset("192.0.2.10");
        let risk_score = sample_risk_score("192.0.2.10");
        let results = serde_json::json!({"open_ports": [22]});

        store
            .complete_scan(scan_id, results.clone(), findings.clone(), asset.clone(), risk_score.clone())
            .await
            .unwrap();
        store
            .complete_scan(scan_id, results, findings, asset, risk_score)
            .await
            .unwrap();

        let found = store.list_findings(scan_id).await.unwrap();
        assert_eq!(found.len(), 1, "re-delivery must not duplicate findings");

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn fail_scan_does_not_apply_after_completion() {
        let store = MemoryStore::new();
        let scan = Scan::new("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}));
        let scan_id = scan.id;
        store.insert_scan(scan).await.unwrap();

        store
            .complete_scan(
                scan_id,
                serde_json::json!({}),
                vec![],
                sample_asset("192.0.2.10"),
                sample_risk_score("192.0.2.10"),
            )
            .await
            .unwrap();

        store.fail_scan(scan_id, "late failure".to_string()).await.unwrap();

        let scan = store.get_scan(scan_id).await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Completed);
        assert!(scan.error_message.is_none());
    }

    #[tokio::test]
    async fn at_most_one_risk_score_per_target() {
        let store = MemoryStore::new();
        let scan1 = Scan::new("192.0.2.10".to_string(), ScannerType::PortFast, serde_json::json!({}));
        let scan2 = Scan::new("192.0.2.10".to_string(), ScannerType::PortDeep, serde_json::json!({}));
        let (id1, id2) = (scan1.id, scan2.id);
        store.insert_scan(scan1).await.unwrap();
        store.insert_scan(scan2).await.unwrap();

        store
            .complete_scan(id1, serde_json::json!({}), vec![], sample_asset("192.0.2.10"), sample_risk_score("192.0.2.10"))
            .await
            .unwrap();
        store
            .complete_scan(id2, serde_json::json!({}), vec![], sample_asset("192.0.2.10"), sample_risk_score("192.0.2.10"))
            .await
            .unwrap();

        let rs = store.get_risk_score("192.0.2.10").await.unwrap();
        assert!(rs.is_some());
    }
}
