//! Error taxonomy for the reconciliation pipeline
//!
//! Every variant is fatal to a run. Anomalies that must not abort a run
//! (foreign rules, unknown flags) never surface here.

use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::rule::Rule;

pub type Result<T> = std::result::Result<T, FleetError>;

/// Which mutation the executor was performing when the backend failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Append,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Append => f.write_str("add"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to read local catalog file {}: {source}", path.display())]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode service catalog: {0}")]
    CatalogDecode(#[from] serde_json::Error),

    #[error("consul request {url} failed: {source}")]
    Consul {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid network CIDR {0:?}")]
    InvalidCidr(String),

    #[error("invalid IP address {0:?}")]
    InvalidAddress(String),

    #[error("failed to list addresses assigned to local interfaces: {0}")]
    Interfaces(#[source] nix::Error),

    #[error("this host has no address in {network} registered in the fleet catalog")]
    NotFound { network: String },

    #[error("failed to parse dst port {token:?} in rule {line:?}: {source}")]
    PortParse {
        line: String,
        token: String,
        #[source]
        source: ParseIntError,
    },

    #[error("failed to list firewall rules: {0}")]
    List(#[source] BackendError),

    #[error("failed to {op} rule with port {} and source {} ({applied} of {total} operations applied): {source}", rule.port, rule.address)]
    Apply {
        op: Operation,
        rule: Rule,
        applied: usize,
        total: usize,
        #[source]
        source: BackendError,
    },
}
