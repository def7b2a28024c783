//! Local interface addresses and managed-network CIDR matching

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use nix::ifaddrs::getifaddrs;
use tracing::debug;

use crate::error::{FleetError, Result};

/// Parse a managed network in `addr/prefix` notation.
///
/// Host bits are cleared, so `10.10.7.9/16` reads back as `10.10.0.0/16`.
pub fn parse_network(s: &str) -> Result<IpNetwork> {
    let invalid = || FleetError::InvalidCidr(s.to_string());
    let network: IpNetwork = s.trim().parse().map_err(|_| invalid())?;
    IpNetwork::new(network.network(), network.prefix()).map_err(|_| invalid())
}

/// Parse a single address given on the command line or in the config
pub fn parse_ip(s: &str) -> Result<IpAddr> {
    s.trim()
        .parse()
        .map_err(|_| FleetError::InvalidAddress(s.to_string()))
}

/// Every IPv4/IPv6 address assigned to a local interface
pub fn local_addresses() -> Result<Vec<IpAddr>> {
    let mut result = Vec::new();
    for ifaddr in getifaddrs().map_err(FleetError::Interfaces)? {
        let Some(address) = ifaddr.address else {
            continue;
        };

        let ip = if let Some(v4) = address.as_sockaddr_in() {
            IpAddr::V4(v4.ip())
        } else if let Some(v6) = address.as_sockaddr_in6() {
            IpAddr::V6(v6.ip())
        } else {
            continue;
        };

        debug!("Interface {} has address {ip}", ifaddr.interface_name);
        result.push(ip);
    }

    Ok(result)
}

/// First local address inside `network`, if any
pub fn first_address_in(network: &IpNetwork) -> Result<Option<IpAddr>> {
    Ok(local_addresses()?
        .into_iter()
        .find(|ip| network.contains(*ip)))
}
