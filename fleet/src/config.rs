//! fw-manager configuration loading and parsing

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::discovery::{DEFAULT_CONSUL_ADDR, PRIMARY_SERVICE_NAME};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fw-manager/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
}

#[derive(Debug, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    /// Managed network; only local addresses inside it identify the host
    #[serde(default = "default_network_cidr")]
    pub cidr: String,
    /// Assume this local address instead of enumerating interfaces
    #[serde(default)]
    pub ip_override: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: default_network_cidr(),
            ip_override: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DiscoveryConfig {
    /// Use this catalog dump instead of querying Consul
    #[serde(default)]
    pub catalog_file: Option<PathBuf>,
    #[serde(default = "default_consul_addr")]
    pub consul_addr: String,
    #[serde(default = "default_consul_token")]
    pub token: Option<String>,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            catalog_file: None,
            consul_addr: default_consul_addr(),
            token: default_consul_token(),
            service_name: default_service_name(),
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FirewallConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Report the plan but never apply it
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            dry_run: false,
        }
    }
}

// Default value functions
fn default_log_level() -> String { "info".into() }
fn default_network_cidr() -> String { "10.10.0.0/16".into() }
fn default_service_name() -> String { PRIMARY_SERVICE_NAME.into() }
fn default_timeout() -> u64 { 30 }
fn default_binary() -> String { "iptables".into() }

/// `CONSUL_HTTP_ADDR` may omit the scheme, the HTTP client may not
fn default_consul_addr() -> String {
    match std::env::var("CONSUL_HTTP_ADDR") {
        Ok(addr) if addr.contains("://") => addr,
        Ok(addr) if !addr.is_empty() => format!("http://{addr}"),
        _ => DEFAULT_CONSUL_ADDR.into(),
    }
}

fn default_consul_token() -> Option<String> {
    std::env::var("CONSUL_HTTP_TOKEN").ok().filter(|t| !t.is_empty())
}

/// Config path: explicit argument, then `FWM_CONFIG`, then the default
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("FWM_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration; a missing file means all defaults.
///
/// Runs before logging is set up, so the caller reports which case applied.
pub fn load_config(path: &Path) -> Result<ManagerConfig, ConfigError> {
    if !path.exists() {
        return Ok(ManagerConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.system.log_level, "info");
        assert_eq!(config.network.cidr, "10.10.0.0/16");
        assert!(config.network.ip_override.is_none());
        assert!(config.discovery.catalog_file.is_none());
        assert_eq!(config.discovery.service_name, "wireguard");
        assert_eq!(config.firewall.binary, "iptables");
        assert!(!config.firewall.dry_run);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
[network]
ip_override = "10.10.0.7"

[firewall]
dry_run = true
"#;
        let config: ManagerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.network.ip_override.as_deref(), Some("10.10.0.7"));
        assert_eq!(config.network.cidr, "10.10.0.0/16");
        assert!(config.firewall.dry_run);
        assert_eq!(config.system.log_level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[system]
log_level = "debug"

[network]
cidr = "10.20.0.0/16"
ip_override = "10.20.0.9"

[discovery]
catalog_file = "/var/lib/fw-manager/catalog.json"
consul_addr = "http://consul.internal:8500"
token = "s3cr3t"
service_name = "mesh"
timeout_seconds = 5

[firewall]
binary = "/usr/sbin/iptables-nft"
dry_run = false
"#;
        let config: ManagerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.system.log_level, "debug");
        assert_eq!(config.network.cidr, "10.20.0.0/16");
        assert_eq!(
            config.discovery.catalog_file,
            Some(PathBuf::from("/var/lib/fw-manager/catalog.json"))
        );
        assert_eq!(config.discovery.consul_addr, "http://consul.internal:8500");
        assert_eq!(config.discovery.token.as_deref(), Some("s3cr3t"));
        assert_eq!(config.discovery.service_name, "mesh");
        assert_eq!(config.discovery.timeout_seconds, 5);
        assert_eq!(config.firewall.binary, "/usr/sbin/iptables-nft");
    }

    #[test]
    fn test_load_missing_config() {
        let config = load_config(Path::new("/nonexistent/fw-manager.toml")).unwrap();
        assert_eq!(config.network.cidr, "10.10.0.0/16");
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\ncidr = \"172.16.0.0/12\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.network.cidr, "172.16.0.0/12");
    }

    #[test]
    fn test_load_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network\ncidr = 1").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/tmp/fwm.toml")));
        assert_eq!(path, PathBuf::from("/tmp/fwm.toml"));
    }
}
