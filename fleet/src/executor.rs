//! Plan execution against a live backend
//!
//! Deletes go first, then appends. The first failing operation stops the
//! run; nothing is rolled back, the next run's diff picks up the rest.

use tracing::info;

use crate::backend::FirewallBackend;
use crate::error::{FleetError, Operation, Result};
use crate::plan::ReconciliationPlan;

/// Apply `plan` and return the number of operations performed
pub fn apply(backend: &dyn FirewallBackend, plan: &ReconciliationPlan) -> Result<usize> {
    let total = plan.len();
    let mut applied = 0;

    let steps = plan
        .to_delete
        .iter()
        .map(|rule| (Operation::Delete, rule))
        .chain(plan.to_add.iter().map(|rule| (Operation::Append, rule)));

    for (op, rule) in steps {
        let outcome = match op {
            Operation::Delete => backend.delete(rule),
            Operation::Append => backend.append_unique(rule),
        };
        outcome.map_err(|source| FleetError::Apply {
            op,
            rule: rule.clone(),
            applied,
            total,
            source,
        })?;

        applied += 1;
        info!("Applied {op}: {rule}");
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::rule::Rule;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(Operation, Rule)>>,
        fail_on: Option<Rule>,
    }

    impl Recorder {
        fn record(&self, op: Operation, rule: &Rule) -> std::result::Result<(), BackendError> {
            if self.fail_on.as_ref() == Some(rule) {
                return Err(BackendError::Rejected("iptables: Bad rule".into()));
            }
            self.calls.borrow_mut().push((op, rule.clone()));
            Ok(())
        }
    }

    impl FirewallBackend for Recorder {
        fn list(&self) -> std::result::Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        fn append_unique(&self, rule: &Rule) -> std::result::Result<(), BackendError> {
            self.record(Operation::Append, rule)
        }

        fn delete(&self, rule: &Rule) -> std::result::Result<(), BackendError> {
            self.record(Operation::Delete, rule)
        }
    }

    fn plan() -> ReconciliationPlan {
        ReconciliationPlan {
            to_add: vec![Rule::new("10.0.0.3", 9100), Rule::new("10.0.0.4", 9100)],
            to_delete: vec![Rule::new("10.0.0.1", 9100), Rule::new("10.0.0.2", 5141)],
        }
    }

    #[test]
    fn test_deletes_before_adds() {
        let backend = Recorder::default();
        let applied = apply(&backend, &plan()).unwrap();
        assert_eq!(applied, 4);

        let ops: Vec<Operation> = backend.calls.borrow().iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Delete,
                Operation::Delete,
                Operation::Append,
                Operation::Append
            ]
        );
    }

    #[test]
    fn test_empty_plan_touches_nothing() {
        let backend = Recorder::default();
        assert_eq!(apply(&backend, &ReconciliationPlan::default()).unwrap(), 0);
        assert!(backend.calls.borrow().is_empty());
    }

    #[test]
    fn test_failure_aborts_and_names_rule() {
        let backend = Recorder {
            fail_on: Some(Rule::new("10.0.0.3", 9100)),
            ..Default::default()
        };

        let err = apply(&backend, &plan()).unwrap_err();
        match &err {
            FleetError::Apply {
                op,
                rule,
                applied,
                total,
                ..
            } => {
                assert_eq!(*op, Operation::Append);
                assert_eq!(rule, &Rule::new("10.0.0.3", 9100));
                assert_eq!(*applied, 2);
                assert_eq!(*total, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("10.0.0.3"));

        // the remaining append was never attempted
        assert_eq!(backend.calls.borrow().len(), 2);
    }
}
