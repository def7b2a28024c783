//! Role-based access policy
//!
//! The policy is a fixed table of grants. Each grant says which hosts it
//! applies to, which members may connect and on which port:
//!   - 9100 - node exporter on ALL hosts, reachable by metrics.*
//!   - 5141 - rsyslog ingest on logs.*, reachable by every member
//!   - 9104 - database exporter on app.*, reachable by metrics.*
//!   - 3306 - database on app.*, reachable by backups.*
//!
//! A new role or port is a new table row.

use tracing::debug;

use crate::catalog::{FleetCatalog, FleetMember};
use crate::role::Role;
use crate::rule::Rule;

pub const NODE_EXPORTER_PORT: u16 = 9100;
pub const SYSLOG_PORT: u16 = 5141;
pub const DB_EXPORTER_PORT: u16 = 9104;
pub const DATABASE_PORT: u16 = 3306;

/// Which local hosts a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Any,
    Role(Role),
}

impl Host {
    fn matches(self, role: Role) -> bool {
        match self {
            Host::Any => true,
            Host::Role(wanted) => wanted == role,
        }
    }
}

/// Which fleet members are allowed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peers {
    Everyone,
    Role(Role),
}

impl Peers {
    fn select<'a>(self, catalog: &'a FleetCatalog) -> Box<dyn Iterator<Item = &'a FleetMember> + 'a> {
        match self {
            Peers::Everyone => Box::new(catalog.members()),
            Peers::Role(role) => Box::new(catalog.role(role).iter()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub service: &'static str,
    pub port: u16,
    pub host: Host,
    pub peers: Peers,
}

pub const POLICY: &[Grant] = &[
    Grant {
        service: "node-exporter",
        port: NODE_EXPORTER_PORT,
        host: Host::Any,
        peers: Peers::Role(Role::Metrics),
    },
    Grant {
        service: "syslog",
        port: SYSLOG_PORT,
        host: Host::Role(Role::Logs),
        peers: Peers::Everyone,
    },
    Grant {
        service: "db-exporter",
        port: DB_EXPORTER_PORT,
        host: Host::Role(Role::App),
        peers: Peers::Role(Role::Metrics),
    },
    Grant {
        service: "database",
        port: DATABASE_PORT,
        host: Host::Role(Role::App),
        peers: Peers::Role(Role::Backups),
    },
];

/// Rules this host needs under the built-in policy
pub fn derive_rules(this_host: &FleetMember, catalog: &FleetCatalog) -> Vec<Rule> {
    derive_rules_with(POLICY, this_host, catalog)
}

/// Rules this host needs under `policy`.
///
/// A member never receives a rule for itself: peers are excluded by `id`,
/// not by address.
pub fn derive_rules_with(
    policy: &[Grant],
    this_host: &FleetMember,
    catalog: &FleetCatalog,
) -> Vec<Rule> {
    let mut result = Vec::new();

    for grant in policy.iter().filter(|g| g.host.matches(this_host.role)) {
        let before = result.len();
        result.extend(
            grant
                .peers
                .select(catalog)
                .filter(|peer| peer.id != this_host.id)
                .map(|peer| Rule::new(&peer.address, grant.port)),
        );
        debug!(
            "{}: {} rules on port {} for {}",
            grant.service,
            result.len() - before,
            grant.port,
            this_host.node
        );
    }

    result
}
