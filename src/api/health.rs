use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: &'static str,
    pub version: &'static str,
    pub store_healthy: bool,
    pub queue_depth: usize,
}

/// Full health check — probes the scan store and reports `core` queue
/// depth. Returns `"degraded"` rather than failing the request when a
/// dependency is unreachable, so monitoring can distinguish "server is up
/// but unhealthy" from "server is unreachable".
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.scan_service.health().await;
    let queue_depth = state.queue.stats("core").await.depth;

    Json(HealthResponse {
        status: if store_healthy { "healthy".to_string() } else { "degraded".to_string() },
        service: "easm-orchestrator",
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
        queue_depth,
    })
}
