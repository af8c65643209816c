//! Scanner Worker template and backends.
//!
//! Each scanner type implements [`ScannerBackend`], a deterministic
//! simulation standing in for the real network scanner binary (§4.5a) —
//! the binary itself is a black box out of scope for this crate. The worker
//! loop in [`worker`] is generic over the backend, mirroring the contract
//! every real scanner (nmap/masscan/nuclei-shaped) would have to satisfy.

pub mod options;
pub mod port_deep;
pub mod port_fast;
pub mod vuln;
pub mod worker;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use options::ScanOptions;

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub protocol: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
    pub id: String,
    pub name: String,
    pub severity: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub accuracy: u8,
}

/// The normalized output every scanner backend produces, matching §4.5's
/// wire shape for `process_scan_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub scanner: String,
    pub target: String,
    pub scan_id: Uuid,
    pub scan_duration: f64,
    pub timestamp: DateTime<Utc>,
    pub open_ports: Vec<u16>,
    pub services: HashMap<u16, ServiceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<VulnerabilityInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_info: Option<OsInfo>,
}

/// Implemented once per scanner type. `run` never shells out to a real
/// binary — see module docs.
#[async_trait]
pub trait ScannerBackend: Send + Sync {
    async fn run(&self, scan_id: Uuid, target: &str, options: &ScanOptions) -> Result<ScanOutcome, Error>;
}

/// `name -> (port, protocol)` table used by the simulated backends to infer
/// a plausible service for each port they report open.
pub(crate) const WELL_KNOWN_SERVICES: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (443, "https"),
    (445, "microsoft-ds"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "mssql"),
    (1521, "oracle"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (5984, "couchdb"),
    (6379, "redis"),
    (8080, "http-proxy"),
    (9200, "elasticsearch"),
    (27017, "mongodb"),
];

pub(crate) fn service_name_for_port(port: u16) -> &'static str {
    WELL_KNOWN_SERVICES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
        .unwrap_or("unknown")
}

/// Resolve a validated target (IP, CIDR, or DNS name) to a single address to
/// connect-scan. CIDR blocks resolve to their network address — scanning an
/// entire block is out of scope for a single `Scan` record.
pub(crate) async fn resolve_target(target: &str) -> Result<std::net::IpAddr, Error> {
    let host = target.split('/').next().unwrap_or(target);

    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| Error::ScannerExecutionFailed(format!("dns resolution failed for '{host}': {e}")))?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| Error::ScannerExecutionFailed(format!("no addresses found for '{host}'")))
}
