//! Capability table and index.
//!
//! A capability is a named predicate over a merged host config. The table is
//! the single place capabilities are defined; adapters only ask the resulting
//! index which hosts qualify.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{config::CapabilityGroups, merge::MergedHostConfig};

pub const DOCKER: &str = "docker";
pub const PODMAN: &str = "podman";
pub const CONTAINER_RUNTIME: &str = "container_runtime";
pub const OLLAMA: &str = "ollama";
pub const PIHOLE: &str = "pihole";
pub const UPS: &str = "ups";
pub const UNIFI: &str = "unifi";

/// Typed condition over a host's merged variables and group memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Variable is present (any value).
    HasVar(String),
    VarEquals {
        key: String,
        value: String,
    },
    /// Host belongs to the group directly or through nesting.
    InGroup(String),
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn matches(&self, host: &MergedHostConfig) -> bool {
        match self {
            Predicate::HasVar(key) => host.has_var(key),
            Predicate::VarEquals { key, value } => host.var(key) == Some(value.as_str()),
            Predicate::InGroup(group) => host.in_group(group),
            Predicate::Any(preds) => preds.iter().any(|p| p.matches(host)),
            Predicate::All(preds) => preds.iter().all(|p| p.matches(host)),
            Predicate::Not(pred) => !pred.matches(host),
        }
    }

    fn group_or_var(group: &str, var: &str) -> Self {
        Predicate::Any(vec![
            Predicate::InGroup(group.to_string()),
            Predicate::HasVar(var.to_string()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub predicate: Predicate,
}

/// Ordered capability name -> predicate table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilityTable {
    entries: Vec<Capability>,
}

impl CapabilityTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capabilities the homelab adapters rely on.
    pub fn builtin(groups: &CapabilityGroups) -> Self {
        let docker = Predicate::group_or_var(&groups.docker, "docker_api_port");
        let podman = Predicate::group_or_var(&groups.podman, "podman_api_port");
        Self::empty()
            .with(DOCKER, docker.clone())
            .with(PODMAN, podman.clone())
            .with(CONTAINER_RUNTIME, Predicate::Any(vec![docker, podman]))
            .with(OLLAMA, Predicate::group_or_var(&groups.ollama, "ollama_port"))
            .with(PIHOLE, Predicate::group_or_var(&groups.pihole, "pihole_api_key"))
            .with(UPS, Predicate::group_or_var(&groups.ups, "nut_port"))
            .with(UNIFI, Predicate::group_or_var(&groups.unifi, "unifi_api_key"))
    }

    /// Add an entry; an existing entry with the same name is replaced in place.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, predicate: Predicate) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.predicate = predicate,
            None => self.entries.push(Capability { name, predicate }),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.entries
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.predicate)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate every entry against every host.
    ///
    /// Hosts are recorded in the order of `hosts`, each at most once.
    pub fn index(&self, hosts: &IndexMap<String, MergedHostConfig>) -> CapabilityIndex {
        let by_name = self
            .entries
            .iter()
            .map(|cap| {
                let matching = hosts
                    .values()
                    .filter(|host| cap.predicate.matches(host))
                    .map(|host| host.name().to_string())
                    .collect();
                (cap.name.clone(), matching)
            })
            .collect();
        CapabilityIndex { by_name }
    }
}

/// Capability name -> qualifying hosts, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CapabilityIndex {
    by_name: IndexMap<String, Vec<String>>,
}

impl CapabilityIndex {
    /// Hosts with `capability`; unknown names yield an empty slice.
    pub fn hosts(&self, capability: &str) -> &[String] {
        self.by_name
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.by_name.contains_key(capability)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.by_name
            .iter()
            .map(|(name, hosts)| (name.as_str(), hosts.as_slice()))
    }
}
