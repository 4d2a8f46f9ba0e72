//! Blocked-entry policy and hostname validation.
//!
//! A mapping `(ip, hostname)` counts as *blocked* when the address is a
//! block address (loopback or unspecified) and the hostname is not one the
//! system itself resolves locally.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{HostsError, Result};

/// Hostnames that stay local even on a loopback address.
pub const LOCAL_HOSTNAMES: &[&str] = &["localhost", "localhost.localdomain"];

/// 127.0.0.0/8, 0.0.0.0, ::1 and ::.
pub fn is_block_address(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || *v4 == Ipv4Addr::UNSPECIFIED,
        IpAddr::V6(v6) => *v6 == Ipv6Addr::LOCALHOST || *v6 == Ipv6Addr::UNSPECIFIED,
    }
}

/// Single-label names, `localhost`, `localhost.localdomain` and `*.localhost`.
pub fn is_local_hostname(hostname: &str) -> bool {
    let h = hostname.trim_end_matches('.');
    if !h.contains('.') {
        return true;
    }
    let h = h.to_ascii_lowercase();
    LOCAL_HOSTNAMES.contains(&h.as_str()) || h.ends_with(".localhost")
}

pub fn is_blocked(ip: &IpAddr, hostname: &str) -> bool {
    is_block_address(ip) && !is_local_hostname(hostname)
}

/// Parse an address token, accepting an optional `%zone` suffix on IPv6.
pub fn parse_ip(token: &str) -> Option<IpAddr> {
    if let Ok(ip) = token.parse::<IpAddr>() {
        return Some(ip);
    }
    let (addr, zone) = token.split_once('%')?;
    if zone.is_empty() {
        return None;
    }
    addr.parse::<Ipv6Addr>().ok().map(IpAddr::V6)
}

/// Parse an address supplied by a caller for add/remove.
pub fn parse_block_address(ip: &str) -> Result<IpAddr> {
    let addr = parse_ip(ip.trim())
        .ok_or_else(|| HostsError::validation("ip", format!("{ip:?} is not an IP address")))?;
    if !is_block_address(&addr) {
        return Err(HostsError::validation(
            "ip",
            format!("{addr} is not a loopback or unspecified address"),
        ));
    }
    Ok(addr)
}

/// Validate hostname format and return it lower-cased.
pub fn validate_hostname(hostname: &str) -> Result<String> {
    let domain = hostname.trim().trim_end_matches('.');
    if domain.is_empty() {
        return Err(HostsError::validation("hostname", "empty hostname"));
    }
    if domain.len() > 253 {
        return Err(HostsError::validation(
            "hostname",
            format!("{domain} is longer than 253 characters"),
        ));
    }
    if domain.contains("..") {
        return Err(HostsError::validation("hostname", "consecutive dots"));
    }
    for label in domain.split('.') {
        if label.is_empty() {
            return Err(HostsError::validation("hostname", "empty label"));
        }
        if label.len() > 63 {
            return Err(HostsError::validation(
                "hostname",
                format!("label {label:?} is longer than 63 characters"),
            ));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return Err(HostsError::validation(
                "hostname",
                format!("illegal char {c:?}"),
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(HostsError::validation(
                "hostname",
                "label cannot start/end with hyphen",
            ));
        }
    }
    if is_local_hostname(domain) {
        return Err(HostsError::validation(
            "hostname",
            format!("{domain} resolves locally and cannot be blocked"),
        ));
    }
    Ok(domain.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn block_addresses() {
        assert!(is_block_address(&ip("127.0.0.1")));
        assert!(is_block_address(&ip("127.3.2.1")));
        assert!(is_block_address(&ip("0.0.0.0")));
        assert!(is_block_address(&ip("::1")));
        assert!(is_block_address(&ip("::")));
        assert!(!is_block_address(&ip("192.168.1.1")));
        assert!(!is_block_address(&ip("fe80::1")));
    }

    #[test]
    fn local_hostnames_are_never_blocked() {
        assert!(!is_blocked(&ip("127.0.0.1"), "localhost"));
        assert!(!is_blocked(&ip("127.0.1.1"), "myhost"));
        assert!(!is_blocked(&ip("::1"), "ip6-localhost"));
        assert!(!is_blocked(&ip("127.0.0.1"), "app.localhost"));
        assert!(!is_blocked(&ip("127.0.0.1"), "localhost.localdomain"));
        assert!(is_blocked(&ip("0.0.0.0"), "ads.example.com"));
        assert!(!is_blocked(&ip("10.0.0.1"), "ads.example.com"));
    }

    #[test]
    fn parse_ip_accepts_zone_suffix() {
        assert_eq!(parse_ip("fe80::1%lo0"), Some(ip("fe80::1")));
        assert_eq!(parse_ip("fe80::1%"), None);
        assert_eq!(parse_ip("not-an-ip"), None);
    }

    #[test]
    fn block_address_must_be_loopback() {
        assert!(parse_block_address("0.0.0.0").is_ok());
        assert!(matches!(
            parse_block_address("8.8.8.8"),
            Err(HostsError::Validation { field: "ip", .. })
        ));
        assert!(parse_block_address("banana").is_err());
    }

    #[test]
    fn hostname_validation() {
        assert_eq!(validate_hostname("Ads.Example.COM").unwrap(), "ads.example.com");
        assert_eq!(validate_hostname("tracker.example.com.").unwrap(), "tracker.example.com");
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("a..b").is_err());
        assert!(validate_hostname("-bad.example.com").is_err());
        assert!(validate_hostname("bad!.example.com").is_err());
        assert!(validate_hostname("localhost").is_err());
        assert!(validate_hostname("single").is_err());
    }
}
