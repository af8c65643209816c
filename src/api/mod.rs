use std::sync::Arc;

use crate::queue::JobQueue;
use crate::scan_service::ScanService;

pub mod health;
pub mod routes;
pub mod scan;

#[derive(Clone)]
pub struct AppState {
    pub scan_service: Arc<ScanService>,
    pub queue: JobQueue,
}

impl AppState {
    pub fn new(scan_service: Arc<ScanService>, queue: JobQueue) -> Self {
        Self { scan_service, queue }
    }
}
