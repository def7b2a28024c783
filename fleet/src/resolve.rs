//! Role resolution — which fleet member is this host?

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tracing::debug;

use crate::catalog::{FleetCatalog, FleetMember};
use crate::error::{FleetError, Result};

/// Match this host's addresses against the catalog.
///
/// Only addresses inside `network` are candidates. Candidates are tried in
/// the order given and the first one registered in the catalog decides the
/// host's identity. There is no fallback role: a host that cannot be matched
/// fails with [`FleetError::NotFound`].
pub fn resolve_self<'a>(
    local_addresses: &[IpAddr],
    network: &IpNetwork,
    catalog: &'a FleetCatalog,
) -> Result<&'a FleetMember> {
    for ip in local_addresses {
        debug!("Checking IP: {ip}");

        if !network.contains(*ip) {
            debug!("... {ip} does not belong to {network}");
            continue;
        }

        match catalog.find_by_ip(*ip) {
            Some(member) => {
                debug!("... {ip} belongs to {} ({})", member.node, member.role);
                return Ok(member);
            }
            None => debug!("... {ip} is not registered in the fleet catalog"),
        }
    }

    Err(FleetError::NotFound {
        network: network.to_string(),
    })
}
