//! `port-deep`: a thorough TCP connect sweep over a wider port set, with
//! service-name inference and a synthetic OS guess. Grounded on
//! `original_source/scanners/scanner-nmap/app/main.py`'s role as the
//! slower, higher-fidelity scan.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{OsInfo, ScanOptions, ScanOutcome, ScannerBackend, ServiceInfo, resolve_target, service_name_for_port};
use crate::error::Error;

const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 443, 445, 993, 995, 1433, 1521, 3306, 3389, 5432,
    5984, 6379, 8080, 9200, 27017,
];
const PER_PORT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct PortDeepBackend;

#[async_trait]
impl ScannerBackend for PortDeepBackend {
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
                        product: guess_product(port),
                        version: None,
                        protocol: "tcp".to_string(),
                        state: "open".to_string(),
                    },
                );
            }
        }

        open_ports.sort_unstable();

        // Deterministic OS guess: a handful of signature ports nudge the
        // fingerprint, purely illustrative — this is a simulated backend,
        // not a real TCP/IP stack fingerprinter.
        let os_info = Some(infer_os(&open_ports));

        Ok(ScanOutcome {
            scanner: "port-deep".to_string(),
            target: target.to_string(),
            scan_id,
            scan_duration: started.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
            open_ports,
            services,
            vulnerabilities: None,
            os_info,
        })
    }
}

fn guess_product(port: u16) -> Option<String> {
    match port {
        22 => Some("OpenSSH".to_string()),
        80 | 8080 => Some("nginx".to_string()),
        443 => Some("nginx (TLS)".to_string()),
        3306 => Some("MySQL".to_string()),
        5432 => Some("PostgreSQL".to_string()),
        _ => None,
    }
}

fn infer_os(open_ports: &[u16]) -> OsInfo {
    if open_ports.contains(&3389) || open_ports.contains(&445) {
        OsInfo { name: "Windows".to_string(), accuracy: 70 }
    } else if open_ports.contains(&22) {
        OsInfo { name: "Linux".to_string(), accuracy: 60 }
    } else {
        OsInfo { name: "unknown".to_string(), accuracy: 0 }
    }
}
