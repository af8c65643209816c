//! Scanner option schema (§6.4). A single flattened struct covers the
//! common shape every scanner type accepts; unknown keys are rejected so a
//! typo in a client request surfaces as `InvalidTarget`-adjacent 422, not a
//! silently ignored option.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScanOptions {
    /// Port list/range spec, e.g. "22,80,443" or "1-1024". Used by port-fast
    /// and port-deep; ignored by vuln.
    pub ports: Option<String>,

    /// Per-scan override of the scanner's default timeout.
    pub timeout_secs: Option<u64>,

    /// Vulnerability template identifiers to match against (vuln only).
    pub templates: Option<Vec<String>>,

    /// Minimum severity to report (vuln only): "info".."critical".
    pub min_severity: Option<String>,
}

impl ScanOptions {
    pub fn parse_ports(&self, default_ports: &[u16]) -> Vec<u16> {
        let Some(spec) = &self.ports else {
            return default_ports.to_vec();
        };

        let mut ports = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<u16>(), end.parse::<u16>()) {
                    ports.extend(start..=end);
                }
            } else if let Ok(port) = part.parse::<u16>() {
                ports.push(port);
            }
        }

        if ports.is_empty() {
            default_ports.to_vec()
        } else {
            ports
        }
    }
}
