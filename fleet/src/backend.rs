//! Packet-filter backend
//!
//! The pipeline only needs three capabilities from the kernel filter:
//! dump the managed chain, append a rule if absent, delete a rule.
//! [`Iptables`] provides them by shelling out to the iptables binary.

use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

use crate::rule::{Rule, CHAIN, OWNERSHIP_COMMENT, PROTOCOL, TABLE, TARGET};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {args} exited with {status}: {stderr}")]
    Failed {
        program: String,
        args: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Rejected(String),
}

pub trait FirewallBackend {
    /// Raw rule lines of the managed chain, in backend syntax
    fn list(&self) -> Result<Vec<String>, BackendError>;

    /// Append `rule` tagged with the ownership comment, unless an identical
    /// rule is already present
    fn append_unique(&self, rule: &Rule) -> Result<(), BackendError>;

    /// Delete the owned copy of `rule`
    fn delete(&self, rule: &Rule) -> Result<(), BackendError>;
}

/// iptables/ip6tables on the `filter` table, `INPUT` chain
#[derive(Debug, Clone)]
pub struct Iptables {
    program: String,
}

impl Iptables {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Rule specification shared by check, append and delete
    pub fn rule_spec(rule: &Rule) -> Vec<String> {
        let port = rule.port.to_string();
        [
            "-p",
            PROTOCOL,
            "-m",
            PROTOCOL,
            "--dport",
            port.as_str(),
            "-s",
            rule.address.as_str(),
            "-m",
            "comment",
            "--comment",
            OWNERSHIP_COMMENT,
            "-j",
            TARGET,
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    fn command_args(action: &str, rule: &Rule) -> Vec<String> {
        let mut args: Vec<String> = ["-w", "-t", TABLE, action, CHAIN]
            .into_iter()
            .map(str::to_string)
            .collect();
        args.extend(Self::rule_spec(rule));
        args
    }

    fn run(&self, args: &[String]) -> Result<Output, BackendError> {
        debug!("Running {} {}", self.program, args.join(" "));
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    fn run_checked(&self, args: &[String]) -> Result<Output, BackendError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(BackendError::Failed {
                program: self.program.clone(),
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// `-C` exits 1 when the rule is absent; anything else non-zero is a
    /// real failure.
    fn exists(&self, rule: &Rule) -> Result<bool, BackendError> {
        let args = Self::command_args("-C", rule);
        let output = self.run(&args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(BackendError::Failed {
                program: self.program.clone(),
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

impl Default for Iptables {
    fn default() -> Self {
        Self::new("iptables")
    }
}

impl FirewallBackend for Iptables {
    fn list(&self) -> Result<Vec<String>, BackendError> {
        let args: Vec<String> = ["-w", "-t", TABLE, "-S", CHAIN]
            .into_iter()
            .map(str::to_string)
            .collect();
        let output = self.run_checked(&args)?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn append_unique(&self, rule: &Rule) -> Result<(), BackendError> {
        if self.exists(rule)? {
            debug!("Rule already present, not appending: {rule}");
            return Ok(());
        }
        self.run_checked(&Self::command_args("-A", rule))?;
        Ok(())
    }

    fn delete(&self, rule: &Rule) -> Result<(), BackendError> {
        self.run_checked(&Self::command_args("-D", rule))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_managed;

    #[test]
    fn test_append_args() {
        let rule = Rule::new("10.10.0.18", 9100);
        let args = Iptables::command_args("-A", &rule).join(" ");
        assert_eq!(
            args,
            "-w -t filter -A INPUT -p tcp -m tcp --dport 9100 -s 10.10.0.18 -m comment --comment FW-MANAGER RULE -j ACCEPT"
        );
    }

    #[test]
    fn test_comment_is_one_argument() {
        let spec = Iptables::rule_spec(&Rule::new("10.10.0.18", 9100));
        let idx = spec.iter().position(|a| a == "--comment").unwrap();
        assert_eq!(spec[idx + 1], OWNERSHIP_COMMENT);
    }

    #[test]
    fn test_appended_rule_reads_back_as_managed() {
        // iptables -S quotes comments containing spaces
        let rule = Rule::new("10.10.0.18", 9100);
        let line = format!(
            "-A INPUT -s {}/32 -p tcp -m tcp --dport {} -m comment --comment \"{}\" -j ACCEPT",
            rule.address, rule.port, OWNERSHIP_COMMENT
        );
        assert_eq!(parse_managed(&[line]).unwrap(), vec![rule]);
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let backend = Iptables::new("/nonexistent/iptables");
        assert!(matches!(backend.list(), Err(BackendError::Spawn { .. })));
        let rule = Rule::new("10.0.0.1", 22);
        assert!(matches!(
            backend.delete(&rule),
            Err(BackendError::Spawn { .. })
        ));
    }

    #[test]
    fn test_default_program() {
        assert_eq!(Iptables::default().program(), "iptables");
    }
}
