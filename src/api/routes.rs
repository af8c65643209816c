use axum::{Router, routing::{get, post}};

use super::AppState;
use super::scan;

/// V1 API routes (§6.1)
///
/// - POST /scan      - start a scan
/// - GET  /scan/{id} - get scan status, findings, and risk score
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(scan::start_scan))
        .route("/scan/{scan_id}", get(scan::get_scan_status))
}
