//! In-memory `ScanStore`, used by tests and as a zero-dependency default.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ScanStore;
use crate::error::Error;
use crate::models::{Asset, Finding, RiskScore, Scan, ScanStatus};

#[derive(Default)]
struct Inner {
    scans: HashMap<Uuid, Scan>,
    findings: HashMap<Uuid, Vec<Finding>>,
    assets: HashMap<String, Asset>,
    risk_scores: HashMap<String, RiskScore>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn insert_scan(&self, scan: Scan) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        inner.scans.insert(scan.id, scan);
        Ok(())
    }

    async fn get_scan(&self, scan_id: Uuid) -> Result<Option<Scan>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner.scans.get(&scan_id).cloned())
    }

    async fn mark_running(&self, scan_id: Uuid) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        let Some(scan) = inner.scans.get_mut(&scan_id) else {
            return Err(Error::NotFound(scan_id));
        };
        if scan.status == ScanStatus::Queued {
            scan.status = ScanStatus::Running;
            scan.started_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn complete_scan(
        &self,
        scan_id: Uuid,
        results: serde_json::Value,
        findings: Vec<Finding>,
        asset: Asset,
        risk_score: RiskScore,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        let Some(scan) = inner.scans.get_mut(&scan_id) else {
            return Err(Error::NotFound(scan_id));
        };

        if scan.status.is_terminal() {
            return Ok(());
        }

        scan.status = ScanStatus::Completed;
        scan.results = Some(results);
        scan.completed_at = Some(Utc::now());

        inner.findings.insert(scan_id, findings);
        inner.assets.insert(asset.target.clone(), asset);
        inner.risk_scores.insert(risk_score.target.clone(), risk_score);
        Ok(())
    }

    async fn fail_scan(&self, scan_id: Uuid, error_message: String) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        let Some(scan) = inner.scans.get_mut(&scan_id) else {
            return Err(Error::NotFound(scan_id));
        };

        if scan.status.is_terminal() {
            return Ok(());
        }

        scan.status = ScanStatus::Failed;
        scan.error_message = Some(error_message);
        scan.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn list_findings(&self, scan_id: Uuid) -> Result<Vec<Finding>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner.findings.get(&scan_id).cloned().unwrap_or_default())
    }

    async fn get_risk_score(&self, target: &str) -> Result<Option<RiskScore>, Error> {
        let inner = self.inner.lock().await;
        Ok(inner.risk_scores.get(target).cloned())
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}
