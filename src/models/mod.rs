pub mod scan;

pub use scan::{
    Asset, AssetType, Finding, FindingType, RiskScore, Scan, ScanStatus, ScannerType, Severity,
};
