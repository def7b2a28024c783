//! fw-manager core — keeps host packet-filter rules in line with the fleet
//!
//! Pipeline: catalog records → [`FleetCatalog`] → this host's
//! [`FleetMember`] → desired [`Rule`]s → diff against the rules owned in
//! the backend → [`ReconciliationPlan`] → [`executor::apply`].
//!
//! Everything up to the plan is pure; only the executor mutates the
//! backend, and the backend's own rule table is the only state.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod net;
pub mod parser;
pub mod plan;
pub mod policy;
pub mod resolve;
pub mod role;
pub mod rule;

pub use backend::{BackendError, FirewallBackend, Iptables};
pub use catalog::{FleetCatalog, FleetMember, ServiceRecord};
pub use error::{FleetError, Operation, Result};
pub use ipnetwork::IpNetwork;
pub use plan::ReconciliationPlan;
pub use policy::derive_rules;
pub use resolve::resolve_self;
pub use role::Role;
pub use rule::Rule;
