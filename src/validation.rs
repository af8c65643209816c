//! Target validation grammar: accept IPv4/IPv6 addresses, CIDR blocks, or DNS
//! names; reject everything else.

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;

fn dns_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid regex")
    })
}

/// Validate a scan target against the IPv4/IPv6/CIDR/DNS-name grammar.
/// Returns `Ok(())` if valid, `Err(Error::InvalidTarget)` otherwise.
pub fn validate_target(target: &str) -> Result<(), Error> {
    if target.is_empty() || target.len() > 253 {
        return Err(Error::InvalidTarget(target.to_string()));
    }

    if target.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    if let Some((addr, prefix)) = target.split_once('/') {
        let prefix_ok = match addr.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => prefix.parse::<u8>().is_ok_and(|p| p <= 32),
            Ok(IpAddr::V6(_)) => prefix.parse::<u8>().is_ok_and(|p| p <= 128),
            Err(_) => false,
        };
        if prefix_ok {
            return Ok(());
        }
        return Err(Error::InvalidTarget(target.to_string()));
    }

    let labels: Vec<&str> = target.split('.').collect();
    if !labels.is_empty() && labels.iter().all(|l| dns_label_re().is_match(l)) {
        return Ok(());
    }

    Err(Error::InvalidTarget(target.to_string()))
}

/// Best-effort classification of a validated target, used when upserting an
/// Asset (§3).
pub fn classify_target(target: &str) -> crate::models::AssetType {
    use crate::models::AssetType;

    match target.parse::<IpAddr>() {
        Ok(_) => AssetType::Ip,
        Err(_) => {
            if target.contains('/') {
                AssetType::Unknown
            } else if target.split('.').all(|l| dns_label_re().is_match(l)) && target.contains('.') {
                AssetType::Domain
            } else {
                AssetType::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ipv4() {
        assert!(validate_target("192.0.2.10").is_ok());
    }

    #[test]
    fn accepts_ipv6() {
        assert!(validate_target("2001:db8::1").is_ok());
    }

    #[test]
    fn accepts_cidr() {
        assert!(validate_target("192.0.2.0/24").is_ok());
    }

    #[test]
    fn accepts_dns_name() {
        assert!(validate_target("example.test").is_ok());
        assert!(validate_target("sub.example.test").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_target("not a host!!").is_err());
        assert!(validate_target("").is_err());
        assert!(validate_target("-leading-dash.test").is_err());
    }

    #[test]
    fn rejects_bad_cidr_prefix() {
        assert!(validate_target("192.0.2.0/99").is_err());
    }

    #[test]
    fn classifies_targets() {
        use crate::models::AssetType;
        assert_eq!(classify_target("192.0.2.10"), AssetType::Ip);
        assert_eq!(classify_target("example.test"), AssetType::Domain);
    }
}
