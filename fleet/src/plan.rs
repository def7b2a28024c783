//! Reconciliation plan — the delta between owned and desired rules

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::backend::FirewallBackend;
use crate::error::{FleetError, Result};
use crate::parser::parse_managed;
use crate::rule::Rule;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub to_add: Vec<Rule>,
    pub to_delete: Vec<Rule>,
}

impl ReconciliationPlan {
    /// Diff `current` against `desired` by `(address, port)`.
    ///
    /// Rules present on both sides are left alone, so applying the plan and
    /// diffing again yields an empty plan.
    pub fn compute(current: &[Rule], desired: &[Rule]) -> Self {
        let current_ids: HashSet<&Rule> = current.iter().collect();
        let desired_ids: HashSet<&Rule> = desired.iter().collect();

        let to_delete = current
            .iter()
            .filter(|rule| !desired_ids.contains(rule))
            .cloned()
            .collect();
        let to_add = desired
            .iter()
            .filter(|rule| !current_ids.contains(rule))
            .cloned()
            .collect();

        Self { to_add, to_delete }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }

    /// Number of backend operations needed to apply the plan
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_delete.len()
    }
}

/// Operator-facing report, one rule per line
impl fmt::Display for ReconciliationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deleted rules:")?;
        for rule in &self.to_delete {
            writeln!(f, "  - {rule}")?;
        }
        writeln!(f, "New rules:")?;
        for rule in &self.to_add {
            writeln!(f, "  - {rule}")?;
        }
        Ok(())
    }
}

/// Rules this tool currently owns in the backend
pub fn current_rules(backend: &dyn FirewallBackend) -> Result<Vec<Rule>> {
    let raw = backend.list().map_err(FleetError::List)?;
    parse_managed(&raw)
}
