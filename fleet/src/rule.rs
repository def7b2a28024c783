//! Inbound access rules owned by this tool

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Comment stamped on every rule this tool creates. Rules without it are
/// never read back as managed and never touched.
pub const OWNERSHIP_COMMENT: &str = "FW-MANAGER RULE";

pub const TABLE: &str = "filter";
pub const CHAIN: &str = "INPUT";
pub const PROTOCOL: &str = "tcp";
pub const TARGET: &str = "ACCEPT";

/// Allow `address` to reach local tcp `port`. Identity is `(address, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rule {
    pub address: String,
    pub port: u16,
}

impl Rule {
    /// Build a rule, canonicalizing the address.
    ///
    /// A host-length prefix (`/32`, `/128`) as printed by `iptables -S` is
    /// dropped and IPs are re-rendered in canonical form, so the dump and the
    /// catalog agree on identity. Anything unparseable is kept verbatim.
    pub fn new(address: impl AsRef<str>, port: u16) -> Self {
        Self {
            address: canonical_address(address.as_ref()),
            port,
        }
    }
}

fn canonical_address(raw: &str) -> String {
    let raw = raw.trim();
    let (host, prefix) = match raw.split_once('/') {
        Some((host, prefix)) => (host, Some(prefix)),
        None => (raw, None),
    };

    match (host.parse::<IpAddr>(), prefix) {
        (Ok(ip), None) => ip.to_string(),
        (Ok(ip @ IpAddr::V4(_)), Some("32")) | (Ok(ip @ IpAddr::V6(_)), Some("128")) => {
            ip.to_string()
        }
        _ => raw.to_string(),
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port: {}, source: {}", self.port, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_prefix_is_stripped() {
        assert_eq!(Rule::new("10.10.0.18/32", 9100), Rule::new("10.10.0.18", 9100));
        assert_eq!(Rule::new("fd00::1/128", 9100).address, "fd00::1");
    }

    #[test]
    fn test_network_prefix_is_kept() {
        assert_eq!(Rule::new("10.10.0.0/16", 22).address, "10.10.0.0/16");
        assert_eq!(Rule::new("fd00::1/32", 22).address, "fd00::1/32");
    }

    #[test]
    fn test_ipv6_is_canonicalized() {
        assert_eq!(Rule::new("FD00:0000::0001", 80).address, "fd00::1");
    }

    #[test]
    fn test_garbage_address_kept_verbatim() {
        assert_eq!(Rule::new("host.example", 80).address, "host.example");
    }

    #[test]
    fn test_identity_is_address_and_port() {
        assert_ne!(Rule::new("10.0.0.1", 80), Rule::new("10.0.0.1", 81));
        assert_ne!(Rule::new("10.0.0.1", 80), Rule::new("10.0.0.2", 80));
    }

    #[test]
    fn test_display() {
        assert_eq!(Rule::new("10.0.0.1", 9100).to_string(), "Port: 9100, source: 10.0.0.1");
    }
}
