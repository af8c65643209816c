//! Deterministic, weighted risk scoring.
//!
//! Transcribed from the EASM risk engine this orchestrator replaces, with one
//! deliberate deviation: the source truncates via `int()`, this
//! implementation rounds, per the governing specification (see DESIGN.md).

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::models::{Finding, FindingType, Severity};

const WEIGHT_OPEN_PORTS: f64 = 0.30;
const WEIGHT_SERVICES: f64 = 0.25;
const WEIGHT_VULNERABILITIES: f64 = 0.35;
const WEIGHT_EXPOSURE: f64 = 0.10;

static HIGH_RISK_PORTS: LazyLock<HashSet<u16>> = LazyLock::new(|| {
    [21, 23, 135, 139, 445, 1433, 1521, 3389, 5432, 5984, 6379, 9200, 27017]
        .into_iter()
        .collect()
});

static MEDIUM_RISK_PORTS: LazyLock<HashSet<u16>> = LazyLock::new(|| {
    [22, 25, 53, 80, 110, 143, 443, 993, 995, 3306, 5432]
        .into_iter()
        .collect()
});

const HIGH_RISK_SERVICES: &[&str] = &[
    "ftp",
    "telnet",
    "rlogin",
    "rsh",
    "finger",
    "tftp",
    "mysql",
    "postgresql",
    "mongodb",
    "redis",
    "elasticsearch",
    "rdp",
    "vnc",
    "ssh",
    "smb",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: String,
    pub factors: HashMap<String, f64>,
}

/// Compute a risk assessment from the set of Findings for a target.
pub fn assess(findings: &[Finding]) -> RiskAssessment {
    if findings.is_empty() {
        return RiskAssessment {
            score: 0,
            level: "none".to_string(),
            factors: HashMap::new(),
        };
    }

    let open_ports = port_risk(findings);
    let services = service_risk(findings);
    let vulnerabilities = vulnerability_risk(findings);
    let exposure = exposure_risk(findings);

    let total = open_ports * WEIGHT_OPEN_PORTS
        + services * WEIGHT_SERVICES
        + vulnerabilities * WEIGHT_VULNERABILITIES
        + exposure * WEIGHT_EXPOSURE;

    let score = total.round().clamp(0.0, 100.0) as u8;

    let mut factors = HashMap::new();
    factors.insert("open_ports".to_string(), open_ports);
    factors.insert("services".to_string(), services);
    factors.insert("vulnerabilities".to_string(), vulnerabilities);
    factors.insert("exposure".to_string(), exposure);

    RiskAssessment {
        score,
        level: level_for(score).to_string(),
        factors,
    }
}

fn port_risk(findings: &[Finding]) -> f64 {
    let mut score: f64 = 0.0;
    for f in findings {
        if f.finding_type != FindingType::OpenPort {
            continue;
        }
        let Some(port) = f.port else { continue };
        score += if HIGH_RISK_PORTS.contains(&port) {
            30.0
        } else if MEDIUM_RISK_PORTS.contains(&port) {
            15.0
        } else {
            5.0
        };
    }
    score.min(100.0)
}

fn service_risk(findings: &[Finding]) -> f64 {
    let mut score: f64 = 0.0;
    for f in findings {
        if f.finding_type != FindingType::Service {
            continue;
        }
        let Some(service) = &f.service else { continue };
        let service = service.to_lowercase();
        score += if HIGH_RISK_SERVICES.iter().any(|s| service.contains(s)) {
            20.0
        } else {
            5.0
        };
    }
    score.min(100.0)
}

fn vulnerability_risk(findings: &[Finding]) -> f64 {
    let mut score: f64 = 0.0;
    for f in findings {
        if f.finding_type != FindingType::Vulnerability {
            continue;
        }
        score += match f.severity {
            Severity::Critical => 40.0,
            Severity::High => 25.0,
            Severity::Medium => 15.0,
            Severity::Low => 5.0,
            Severity::Info => 0.0,
        };
    }
    score.min(100.0)
}

fn exposure_risk(findings: &[Finding]) -> f64 {
    let open_ports = findings
        .iter()
        .filter(|f| f.finding_type == FindingType::OpenPort)
        .count();

    match open_ports {
        0 => 0.0,
        1..=3 => 20.0,
        4..=10 => 50.0,
        _ => 80.0,
    }
}

fn level_for(score: u8) -> &'static str {
    match score {
        80..=100 => "critical",
        60..=79 => "high",
        40..=59 => "medium",
        20..=39 => "low",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn open_port(port: u16) -> Finding {
        Finding {
            id: Uuid::new_v4(),
            scan_id: Uuid::new_v4(),
            target: "192.0.2.10".to_string(),
            finding_type: FindingType::OpenPort,
            severity: Severity::Medium,
            title: format!("Open port {port}"),
            description: String::new(),
            port: Some(port),
            service: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            verified: true,
        }
    }

    fn vuln(severity: Severity) -> Finding {
        Finding {
            id: Uuid::new_v4(),
            scan_id: Uuid::new_v4(),
            target: "example.test".to_string(),
            finding_type: FindingType::Vulnerability,
            severity,
            title: "vuln".to_string(),
            description: String::new(),
            port: None,
            service: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            verified: true,
        }
    }

    #[test]
    fn empty_findings_score_zero() {
        let r = assess(&[]);
        assert_eq!(r.score, 0);
        assert_eq!(r.level, "none");
    }

    #[test]
    fn simple_port_scan() {
        let findings = vec![open_port(22), open_port(80)];
        let r = assess(&findings);
        assert_eq!(r.factors["open_ports"], 30.0);
        assert_eq!(r.factors["exposure"], 20.0);
        assert_eq!(r.score, 11);
        assert_eq!(r.level, "info");
    }

    #[test]
    fn high_risk_port_scan() {
        let findings = vec![open_port(3389), open_port(445)];
        let r = assess(&findings);
        assert_eq!(r.factors["open_ports"], 60.0);
        assert_eq!(r.score, 20);
        assert_eq!(r.level, "low");
    }

    #[test]
    fn single_critical_vuln() {
        let findings = vec![vuln(Severity::Critical)];
        let r = assess(&findings);
        assert_eq!(r.factors["vulnerabilities"], 40.0);
        assert_eq!(r.score, 14);
        assert_eq!(r.level, "info");
    }

    #[test]
    fn caps_at_100() {
        let findings: Vec<Finding> = (0..10).map(|_| vuln(Severity::Critical)).collect();
        let r = assess(&findings);
        assert_eq!(r.factors["vulnerabilities"], 100.0);
    }
}
