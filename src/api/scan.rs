//! Ingress API for scans (§4.7, §6.1). Grounded on the teacher's
//! `api::scan` handler shapes (axum extractors, typed request/response
//! DTOs), generalized from the AI-guard scan domain to EASM scans.

use axum::{Json, extract::{Path, State}};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::error::Error;
use crate::models::{Finding, RiskScore, ScannerType};

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub target: String,
    pub scanner: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub scan_id: Uuid,
    pub status: &'static str,
    pub message: String,
}

/// `POST /api/v1/scan` — validate, persist as `queued`, and enqueue
/// `scan_asset` onto the `core` queue.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<StartScanRequest>,
) -> Result<Json<StartScanResponse>, Error> {
    let scanner: ScannerType = req.scanner.parse()?;
    let scan = state
        .scan_service
        .create_scan(req.target.clone(), scanner, req.options.clone())
        .await?;

    let job_args = serde_json::json!({
        "scan_id": scan.id,
        "payload": {"target": req.target, "scanner": req.scanner, "options": req.options},
    });
    state.queue.enqueue("core", "scan_asset", job_args).await?;

    tracing::info!(scan_id = %scan.id, target = %scan.target, "scan accepted");

    Ok(Json(StartScanResponse {
        scan_id: scan.id,
        status: "queued",
        message: "Scan accepted".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub scan_id: Uuid,
    pub target: String,
    pub scanner: ScannerType,
    pub status: crate::models::ScanStatus,
    pub progress: u8,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<RiskScore>,
}

/// `GET /api/v1/scan/{scan_id}`.
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ScanStatusResponse>, Error> {
    let view = state.scan_service.get_scan_view(scan_id).await?;

    Ok(Json(ScanStatusResponse {
        scan_id: view.scan.id,
        target: view.scan.target,
        scanner: view.scan.scanner,
        progress: view.scan.status.progress(),
        status: view.scan.status,
        created_at: view.scan.created_at,
        started_at: view.scan.started_at,
        completed_at: view.scan.completed_at,
        results: view.scan.results,
        error: view.scan.error_message,
        findings: view.findings,
        risk_score: view.risk_score,
    }))
}
