//! Consul service discovery
//!
//! Two sources of catalog records: a JSON file dumped beforehand (e.g. with
//! curl against `/v1/catalog/service/wireguard`), or the live catalog API
//! queried datacenter by datacenter.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{decode_records, ServiceRecord};
use crate::error::{FleetError, Result};

pub const PRIMARY_SERVICE_NAME: &str = "wireguard";
pub const DEFAULT_CONSUL_ADDR: &str = "http://127.0.0.1:8500";

/// Read and decode a catalog dump from disk
pub fn read_local_catalog(path: &Path) -> Result<Vec<ServiceRecord>> {
    let data = std::fs::read(path).map_err(|source| FleetError::CatalogRead {
        path: path.to_path_buf(),
        source,
    })?;
    let records = decode_records(&data)?;
    info!("Read {} catalog records from {}", records.len(), path.display());
    Ok(records)
}

/// HTTP check attached to a service registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCheck {
    #[serde(rename = "HTTP")]
    pub http: String,
    #[serde(rename = "Interval")]
    pub interval: String,
    #[serde(rename = "Timeout")]
    pub timeout: String,
}

/// Body of `PUT /v1/agent/service/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Check")]
    pub check: ServiceCheck,
    #[serde(rename = "Meta")]
    pub meta: HashMap<String, String>,
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
}

impl ServiceRegistration {
    /// Registration for a fleet node: the `<env>.<stage>` tag is what the
    /// normalizer later turns into a role.
    pub fn for_node(
        name: &str,
        address: &str,
        port: u16,
        check_host: &str,
        env: &str,
        stage: &str,
    ) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            port,
            address: address.to_string(),
            check: ServiceCheck {
                http: format!("http://{check_host}:{port}/check"),
                interval: "10s".to_string(),
                timeout: "30s".to_string(),
            },
            meta: HashMap::from([
                ("env".to_string(), env.to_string()),
                ("stage".to_string(), stage.to_string()),
            ]),
            tags: vec![
                format!("{env}.{stage}"),
                PRIMARY_SERVICE_NAME.to_string(),
                "vpn".to_string(),
            ],
        }
    }
}

/// Minimal client for the Consul HTTP API
pub struct ConsulClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ConsulClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match self.token {
            Some(ref token) => builder.header("X-Consul-Token", token),
            None => builder,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");
        let consul_err = |source: reqwest::Error| FleetError::Consul {
            url: url.clone(),
            source,
        };

        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(consul_err)?;
        let body = response.bytes().await.map_err(consul_err)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// All datacenters known to the cluster
    pub async fn datacenters(&self) -> Result<Vec<String>> {
        self.get_json("/v1/catalog/datacenters").await
    }

    /// Registrations of `service` in one datacenter
    pub async fn service(&self, service: &str, datacenter: &str) -> Result<Vec<ServiceRecord>> {
        let records: Vec<ServiceRecord> = self
            .get_json::<Option<Vec<ServiceRecord>>>(&format!(
                "/v1/catalog/service/{service}?dc={datacenter}"
            ))
            .await?
            .unwrap_or_default();
        debug!("{} registrations of {service} in {datacenter}", records.len());
        Ok(records)
    }

    /// Registrations of `service` across `datacenters`, concatenated in order.
    /// The first failing datacenter fails the whole fetch.
    pub async fn fleet_records(
        &self,
        service: &str,
        datacenters: &[String],
    ) -> Result<Vec<ServiceRecord>> {
        let mut all = Vec::new();
        for dc in datacenters {
            all.extend(self.service(service, dc).await?);
        }
        info!(
            "Fetched {} registrations of {service} from {} datacenters",
            all.len(),
            datacenters.len()
        );
        Ok(all)
    }

    /// Register a service with the local agent
    pub async fn register(&self, registration: &ServiceRegistration) -> Result<()> {
        let path = "/v1/agent/service/register";
        let url = format!("{}{path}", self.base_url);
        self.request(reqwest::Method::PUT, path)
            .json(registration)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| FleetError::Consul { url, source })?;
        Ok(())
    }
}
