//! Fleet roles and tag-to-role resolution

use serde::{Deserialize, Serialize};

/// Category a fleet member is tagged with in the service catalog.
///
/// A registration carries tags like `metrics.prod`; the part before the
/// first dot selects the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Unknown,
    Logs,
    Metrics,
    App,
    Backups,
}

impl Role {
    /// Roles that can be claimed through a `<role>.<env>` tag
    pub const TAGGED: [Role; 4] = [Role::Logs, Role::Metrics, Role::App, Role::Backups];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::Logs => "logs",
            Role::Metrics => "metrics",
            Role::App => "app",
            Role::Backups => "backups",
        }
    }

    /// Resolve the role of a registration from its free-text tags.
    ///
    /// Tags are scanned in order and the first one shaped like `<role>.`
    /// wins; `Unknown` when nothing matches.
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Role {
        tags.iter()
            .find_map(|tag| Self::from_tag(tag.as_ref()))
            .unwrap_or(Role::Unknown)
    }

    fn from_tag(tag: &str) -> Option<Role> {
        let (prefix, _) = tag.split_once('.')?;
        Self::TAGGED.into_iter().find(|role| role.as_str() == prefix)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_tag_among_others() {
        let tags = ["eu-dc1", "metrics.prod", "wireguard"];
        assert_eq!(Role::from_tags(&tags), Role::Metrics);
    }

    #[test]
    fn test_every_tagged_role() {
        assert_eq!(Role::from_tags(&["logs.test"]), Role::Logs);
        assert_eq!(Role::from_tags(&["app.prod"]), Role::App);
        assert_eq!(Role::from_tags(&["backups.prod"]), Role::Backups);
    }

    #[test]
    fn test_no_role_prefix_is_unknown() {
        assert_eq!(Role::from_tags(&["eu-dc1", "wireguard", "vpn"]), Role::Unknown);
        assert_eq!(Role::from_tags::<&str>(&[]), Role::Unknown);
    }

    #[test]
    fn test_prefix_must_be_whole_role_name() {
        // "apps." and "metric." are not role prefixes
        assert_eq!(Role::from_tags(&["apps.prod", "metric.test"]), Role::Unknown);
        // a bare role name without the dot does not count either
        assert_eq!(Role::from_tags(&["logs"]), Role::Unknown);
    }

    #[test]
    fn test_first_matching_tag_wins() {
        let tags = vec!["backups.prod".to_string(), "logs.prod".to_string()];
        assert_eq!(Role::from_tags(&tags), Role::Backups);
    }

    #[test]
    fn test_display() {
        assert_eq!(Role::Metrics.to_string(), "metrics");
        assert_eq!(Role::Unknown.to_string(), "unknown");
    }
}
