use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ScannerType {
    PortFast,
    PortDeep,
    Vuln,
}

impl ScannerType {
    pub const ALL: [ScannerType; 3] = [ScannerType::PortFast, ScannerType::PortDeep, ScannerType::Vuln];

    /// Name of the dedicated scanner queue for this scanner type.
    pub fn queue_name(&self) -> String {
        format!("scanner-{}", self)
    }

    /// Name of the job function a worker for this scanner type consumes.
    pub fn job_function(&self) -> String {
        format!("run_{}", self)
    }
}

impl fmt::Display for ScannerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScannerType::PortFast => "port-fast",
            ScannerType::PortDeep => "port-deep",
            ScannerType::Vuln => "vuln",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScannerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "port-fast" => Ok(ScannerType::PortFast),
            "port-deep" => Ok(ScannerType::PortDeep),
            "vuln" => Ok(ScannerType::Vuln),
            other => Err(Error::UnsupportedScanner(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ScanStatus::Queued),
            "running" => Ok(ScanStatus::Running),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(Error::IllegalTransition(format!("unknown scan status '{other}'"))),
        }
    }
}

impl ScanStatus {
    /// Coarse progress percentage exposed on the public status view.
    pub fn progress(&self) -> u8 {
        match self {
            ScanStatus::Queued => 0,
            ScanStatus::Running => 50,
            ScanStatus::Completed | ScanStatus::Failed => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub target: String,
    pub scanner: ScannerType,
    pub status: ScanStatus,
    pub options: Value,
    pub results: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Scan {
    pub fn new(target: String, scanner: ScannerType, options: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            scanner,
            status: ScanStatus::Queued,
            options,
            results: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FindingType {
    OpenPort,
    Service,
    Vulnerability,
}

impl fmt::Display for FindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingType::OpenPort => "open-port",
            FindingType::Service => "service",
            FindingType::Vulnerability => "vulnerability",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(Error::IllegalTransition(format!("unknown severity '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub target: String,
    pub finding_type: FindingType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub port: Option<u16>,
    pub service: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Ip,
    Domain,
    Url,
    Unknown,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetType::Ip => "ip",
            AssetType::Domain => "domain",
            AssetType::Url => "url",
            AssetType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub target: String,
    pub asset_type: AssetType,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub id: Uuid,
    pub target: String,
    pub score: u8,
    pub level: String,
    pub factors: HashMap<String, f64>,
    pub calculated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
