//! Host inventory.
//!
//! The inventory is an ordered list of network devices. Dispatch only ever reads it: hosts are
//! selected by name, group and model, and the selected names are handed to execution units.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use serde::de::{self, value::MapAccessDeserializer, MapAccess, Unexpected, Visitor};
use serde::{Deserialize, Deserializer};
use void::Void;

use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostRecord {
    /// Unique key of the host.
    pub name: String,
    /// Group the host belongs to, if any.
    #[serde(default)]
    pub group: Option<String>,
    /// Model / OS type (ios, junos, ...). Used for filtering, independent of the transport.
    #[serde(default)]
    pub model: String,
    /// Address to dial. Falls back to `name`.
    #[serde(default, rename = "ip")]
    pub address: Option<String>,
}

impl HostRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
            model: String::new(),
            address: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// The address the connection layer should dial.
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.name)
    }
}

impl FromStr for HostRecord {
    type Err = Void;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Source of host records. Iteration order is the order hosts are dispatched in.
pub trait Inventory {
    fn all_hosts(&self) -> &[HostRecord];

    fn find(&self, name: &str) -> Option<&HostRecord> {
        self.all_hosts().iter().find(|host| host.name == name)
    }
}

impl Inventory for Vec<HostRecord> {
    fn all_hosts(&self) -> &[HostRecord] {
        self
    }
}

/// One inventory entry, written either as a bare host name or as a full mapping.
#[derive(Debug)]
struct HostEntry(HostRecord);

impl<'de> Deserialize<'de> for HostEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(HostEntryVisitor).map(HostEntry)
    }
}

struct HostEntryVisitor;

impl<'de> Visitor<'de> for HostEntryVisitor {
    type Value = HostRecord;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a host name or a host mapping with a non-empty `name`")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let name = value.trim();
        if name.is_empty() {
            return Err(E::invalid_value(Unexpected::Str(value), &self));
        }
        match name.parse::<HostRecord>() {
            Ok(host) => Ok(host),
            Err(never) => void::unreachable(never),
        }
    }

    fn visit_map<M>(self, map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut host = HostRecord::deserialize(MapAccessDeserializer::new(map))?;
        host.name = host.name.trim().to_string();
        if host.name.is_empty() {
            return Err(de::Error::custom("host mapping has an empty `name`"));
        }
        Ok(host)
    }
}

/// Inventory backed by a YAML file.
///
/// Each entry is either a bare host name or a mapping:
///
/// ```yaml
/// - core-sw1
/// - name: edge-rtr1
///   group: edge
///   model: junos
///   ip: 10.0.0.1
/// ```
#[derive(Debug, Clone)]
pub struct YamlInventory {
    hosts: Vec<HostRecord>,
}

impl YamlInventory {
    pub fn load(hosts_file: &str) -> Result<Self> {
        let hosts_fd = File::open(hosts_file)?;
        let entries: Vec<HostEntry> =
            serde_yaml::from_reader(hosts_fd).map_err(|source| DispatchError::Inventory {
                path: hosts_file.to_string(),
                source,
            })?;
        let hosts = entries.into_iter().map(|HostEntry(host)| host).collect();
        Self::from_records(hosts)
    }

    /// Like `load`, but a missing file is an empty inventory.
    pub fn load_if_exists(hosts_file: &str) -> Result<Self> {
        if Path::new(hosts_file).exists() {
            Self::load(hosts_file)
        } else {
            tracing::warn!("Inventory {} not found, continuing with no hosts", hosts_file);
            Self::from_records(vec![])
        }
    }

    pub fn from_records(hosts: Vec<HostRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(hosts.len());
        for host in &hosts {
            if !seen.insert(host.name.as_str()) {
                return Err(DispatchError::DuplicateHost(host.name.clone()));
            }
        }
        tracing::debug!(count = hosts.len(), "Inventory loaded");
        Ok(Self { hosts })
    }
}

impl Inventory for YamlInventory {
    fn all_hosts(&self) -> &[HostRecord] {
        &self.hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Vec<HostRecord> {
        let entries: Vec<HostEntry> = serde_yaml::from_str(yaml).unwrap();
        entries.into_iter().map(|HostEntry(host)| host).collect()
    }

    #[test]
    fn test_bare_string_entry() {
        let hosts = parse("- core-sw1");
        assert_eq!(hosts, vec![HostRecord::new("core-sw1")]);
        assert_eq!(hosts[0].address(), "core-sw1");
    }

    #[test]
    fn test_mapping_entry() {
        let hosts = parse(
            r#"
- name: edge-rtr1
  group: edge
  model: junos
  ip: 10.0.0.1
"#,
        );
        assert_eq!(
            hosts[0],
            HostRecord::new("edge-rtr1")
                .with_group("edge")
                .with_model("junos")
                .with_address("10.0.0.1")
        );
        assert_eq!(hosts[0].address(), "10.0.0.1");
    }

    #[test]
    fn test_mixed_entries_keep_file_order() {
        let hosts = parse("- a\n- name: b\n  group: g\n- c");
        let names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(hosts[1].group.as_deref(), Some("g"));
        assert_eq!(hosts[1].model, "");
    }

    #[test]
    fn test_names_are_trimmed() {
        let hosts = parse("- '  sw1 '\n- name: ' sw2'");
        let names: Vec<_> = hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["sw1", "sw2"]);
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(serde_yaml::from_str::<Vec<HostEntry>>("- '  '").is_err());
        assert!(serde_yaml::from_str::<Vec<HostEntry>>("- name: ''\n  group: g").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = YamlInventory::from_records(vec![HostRecord::new("a"), HostRecord::new("a")]);
        assert!(matches!(result, Err(DispatchError::DuplicateHost(name)) if name == "a"));
    }

    #[test]
    fn test_find() {
        let inventory = vec![HostRecord::new("a"), HostRecord::new("b").with_model("ios")];
        assert_eq!(inventory.find("b").map(|h| h.model.as_str()), Some("ios"));
        assert!(inventory.find("z").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(HostRecord::new("sw1").to_string(), "[sw1]");
    }
}
