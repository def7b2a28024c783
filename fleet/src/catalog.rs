//! Fleet catalog — discovery records normalized into a role-indexed model

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::role::Role;

/// One service registration as served by the Consul catalog API.
///
/// Only the fields the pipeline needs are kept; everything else in the
/// record is ignored on decode. A field that is absent or `null` decodes
/// as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "Node", default, deserialize_with = "null_as_default")]
    pub node: String,
    #[serde(rename = "ServiceAddress", default, deserialize_with = "null_as_default")]
    pub service_address: String,
    #[serde(rename = "ServiceTags", default, deserialize_with = "null_as_default")]
    pub service_tags: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A managed node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetMember {
    pub role: Role,
    pub id: String,
    pub node: String,
    pub address: String,
}

impl FleetMember {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            role: Role::from_tags(&record.service_tags),
            id: record.id.clone(),
            node: record.node.clone(),
            address: record.service_address.clone(),
        }
    }

    /// Address as an IP; `None` when the registration carries garbage
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }
}

/// Role-indexed view of every discovered member.
///
/// Members keep discovery order within a role. A member appears exactly
/// once, under the role its tags resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetCatalog {
    roles: BTreeMap<Role, Vec<FleetMember>>,
}

impl FleetCatalog {
    /// Group discovery records by role. Total: an empty slice gives an
    /// empty catalog, mis-tagged records land in the `Unknown` bucket and
    /// repeated records stay repeated.
    pub fn normalize(records: &[ServiceRecord]) -> Self {
        let mut catalog = Self::default();
        for record in records {
            catalog.insert(FleetMember::from_record(record));
        }
        debug!(
            "Normalized {} catalog records into {} roles",
            records.len(),
            catalog.roles.len()
        );
        catalog
    }

    /// Decode a JSON array of catalog records and normalize it.
    /// A literal `null` is treated like an empty array.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let records = decode_records(data)?;
        Ok(Self::normalize(&records))
    }

    pub fn insert(&mut self, member: FleetMember) {
        self.roles.entry(member.role).or_default().push(member);
    }

    /// Members registered under `role`, in discovery order
    pub fn role(&self, role: Role) -> &[FleetMember] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Roles present in the catalog with their members
    pub fn iter(&self) -> impl Iterator<Item = (Role, &[FleetMember])> {
        self.roles.iter().map(|(role, members)| (*role, members.as_slice()))
    }

    /// Every member across all roles
    pub fn members(&self) -> impl Iterator<Item = &FleetMember> {
        self.roles.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.roles.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// First member whose address equals `ip` by IP equality.
    ///
    /// Roles are searched in catalog order. An address registered under two
    /// roles is a tagging error upstream; whichever is found first is returned.
    pub fn find_by_ip(&self, ip: IpAddr) -> Option<&FleetMember> {
        self.members().find(|member| member.ip() == Some(ip))
    }
}

/// Decode raw catalog JSON into records
pub fn decode_records(data: &[u8]) -> Result<Vec<ServiceRecord>> {
    let records: Option<Vec<ServiceRecord>> = serde_json::from_slice(data)?;
    Ok(records.unwrap_or_default())
}
