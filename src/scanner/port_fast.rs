//! `port-fast`: a best-effort TCP connect sweep over a small default port
//! set. Grounded on `original_source/scanners/scanner-masscan`'s role as the
//! quick, wide, low-fidelity sweep in the pipeline.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{ScanOptions, ScanOutcome, ScannerBackend, ServiceInfo, resolve_target, service_name_for_port};
use crate::error::Error;

const DEFAULT_PORTS: &[u16] = &[21, 22, 23, 25, 53, 80, 443, 3306, 3389, 5432, 6379, 8080];
const PER_PORT_TIMEOUT: Duration = Duration::from_millis(300);

pub struct PortFastBackend;

#[async_trait]
impl ScannerBackend for PortFastBackend {
    async fn run(&self, scan_id: Uuid, target: &str, options: &ScanOptions) -> Result<ScanOutcome, Error> {
        let started = Instant::now();
        let ip = resolve_target(target).await?;
        let ports = options.parse_ports(DEFAULT_PORTS);

        let mut open_ports = Vec::new();
        let mut services = std::collections::HashMap::new();

        for port in ports {
            let addr = SocketAddr::new(ip, port);
            let connect = tokio::time::timeout(PER_PORT_TIMEOUT, tokio::net::TcpStream::connect(addr)).await;
            if matches!(connect, Ok(Ok(_))) {
                open_ports.push(port);
                services.insert(
                    port,
                    ServiceInfo {
                        name: service_name_for_port(port).to_string(),
                        product: None,
                        version: None,
                        protocol: "tcp".to_string(),
                        state: "open".to_string(),
                    },
                );
            }
        }

        open_ports.sort_unstable();

        Ok(ScanOutcome {
            scanner: "port-fast".to_string(),
            target: target.to_string(),
            scan_id,
            scan_duration: started.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
            open_ports,
            services,
            vulnerabilities: None,
            os_info: None,
        })
    }
}
