//! Resolved, immutable inventory snapshots.
//!
//! `Snapshot::resolve` runs the whole pipeline: parse, build the group graph,
//! merge vars, index capabilities and project enums. A snapshot is never
//! mutated after it is built; reloads build a new one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::{
    capability::{CapabilityIndex, CapabilityTable},
    config::CapabilityGroups,
    error::{InventoryError, InventoryResult},
    graph::{GroupGraph, ALL_GROUP},
    merge::{merge_hosts, MergedHostConfig},
    parser::{parse_document, VarMap},
    projection::{normalize_host_name, EnumProjection},
};

/// Caller contract applied while resolving.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Variables every host record must declare inline.
    pub required_host_vars: Vec<String>,
    pub capabilities: CapabilityTable,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            required_host_vars: Vec::new(),
            capabilities: CapabilityTable::builtin(&CapabilityGroups::default()),
        }
    }
}

/// A group as seen after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub name: String,
    pub vars: VarMap,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    /// Hosts listed in this group's own `hosts` section.
    pub direct_hosts: Vec<String>,
    /// Hosts of this group and every nested group, in document order.
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub hosts: usize,
    pub groups: usize,
    pub group_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    generation: u64,
    source: String,
    loaded_at: DateTime<Utc>,
    hosts: IndexMap<String, MergedHostConfig>,
    groups: IndexMap<String, GroupView>,
    capabilities: CapabilityIndex,
    enums: EnumProjection,
    /// Display name -> host key; `None` when several hosts share the display name.
    #[serde(skip)]
    by_display: HashMap<String, Option<String>>,
}

impl Snapshot {
    /// Snapshot served before anything has been loaded: no hosts, only `all`.
    pub fn empty(source: impl Into<String>, capabilities: &CapabilityTable) -> Self {
        let hosts = IndexMap::new();
        let mut groups = IndexMap::new();
        groups.insert(
            ALL_GROUP.to_string(),
            GroupView {
                name: ALL_GROUP.to_string(),
                vars: VarMap::new(),
                parents: Vec::new(),
                children: Vec::new(),
                direct_hosts: Vec::new(),
                hosts: Vec::new(),
            },
        );
        Self::assemble(0, source.into(), hosts, groups, capabilities)
    }

    /// Resolve raw inventory bytes into a snapshot.
    pub fn resolve(
        bytes: &[u8],
        options: &ResolveOptions,
        source: impl Into<String>,
        generation: u64,
    ) -> InventoryResult<Self> {
        let mut doc = parse_document(bytes, &options.required_host_vars)?;
        let graph = GroupGraph::build(&mut doc)?;
        let hosts = merge_hosts(&doc, &graph)?;
        let host_order: Vec<&str> = hosts.keys().map(String::as_str).collect();

        let mut groups = IndexMap::with_capacity(graph.len());
        for (index, def) in doc.groups().enumerate() {
            let members = graph.with_descendants(index);
            let member_hosts: Vec<String> = host_order
                .iter()
                .filter(|host| {
                    hosts.get(**host).is_some_and(|h| {
                        h.direct_groups()
                            .iter()
                            .any(|g| graph.index_of(g).is_some_and(|i| members.contains(&i)))
                    })
                })
                .map(|host| host.to_string())
                .collect();

            let mut direct_hosts: Vec<String> = Vec::new();
            for record in &def.hosts {
                if !direct_hosts.contains(&record.name) {
                    direct_hosts.push(record.name.clone());
                }
            }

            groups.insert(
                def.name.clone(),
                GroupView {
                    name: def.name.clone(),
                    vars: def.vars.clone(),
                    parents: names(&graph, graph.parents(index)),
                    children: names(&graph, graph.children(index)),
                    direct_hosts,
                    hosts: member_hosts,
                },
            );
        }

        if groups.len() != graph.len() {
            return Err(InventoryError::Resolution(format!(
                "resolved {} groups but graph has {}",
                groups.len(),
                graph.len()
            )));
        }

        let snapshot = Self::assemble(
            generation,
            source.into(),
            hosts,
            groups,
            &options.capabilities,
        );
        debug!(
            generation,
            hosts = snapshot.hosts.len(),
            groups = snapshot.groups.len(),
            "Resolved inventory snapshot"
        );
        Ok(snapshot)
    }

    fn assemble(
        generation: u64,
        source: String,
        hosts: IndexMap<String, MergedHostConfig>,
        groups: IndexMap<String, GroupView>,
        table: &CapabilityTable,
    ) -> Self {
        let capabilities = table.index(&hosts);
        let mut by_display: HashMap<String, Option<String>> = HashMap::new();
        for host in hosts.values() {
            by_display
                .entry(host.display_name())
                .and_modify(|owner| *owner = None)
                .or_insert_with(|| Some(host.name().to_string()));
        }
        let enums = EnumProjection::project(
            hosts.keys().map(String::as_str),
            groups.keys().map(String::as_str),
            &capabilities,
        );
        Self {
            generation,
            source,
            loaded_at: Utc::now(),
            hosts,
            groups,
            capabilities,
            enums,
            by_display,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Merged host record. Host names are matched case-insensitively.
    ///
    /// A bare name without dots also matches the one host whose display name
    /// it normalizes to (`ups-box` or `Ups_Box` finds `ups_box.lan`), so keys
    /// from [`Snapshot::group_addresses`] can be looked up again. A display
    /// name shared by several hosts matches none of them.
    pub fn host(&self, host_name: &str) -> InventoryResult<&MergedHostConfig> {
        let key = crate::parser::normalize_host_key(host_name);
        if let Some(host) = self.hosts.get(&key) {
            return Ok(host);
        }
        if !key.contains('.') {
            if let Some(Some(owner)) = self.by_display.get(&normalize_host_name(&key)) {
                if let Some(host) = self.hosts.get(owner) {
                    return Ok(host);
                }
            }
        }
        Err(InventoryError::UnknownHost(host_name.to_string()))
    }

    pub fn merged_config(&self, host_name: &str) -> InventoryResult<&VarMap> {
        self.host(host_name).map(MergedHostConfig::vars)
    }

    /// Hosts in document order (first-seen).
    pub fn hosts(&self) -> impl Iterator<Item = &MergedHostConfig> {
        self.hosts.values()
    }

    pub fn group(&self, group_name: &str) -> InventoryResult<&GroupView> {
        self.groups
            .get(group_name)
            .ok_or_else(|| InventoryError::UnknownGroup(group_name.to_string()))
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupView> {
        self.groups.values()
    }

    /// Hosts of the group and its nested groups, in document order.
    pub fn hosts_in_group(&self, group_name: &str) -> InventoryResult<&[String]> {
        self.group(group_name).map(|g| g.hosts.as_slice())
    }

    /// Hosts with `capability` in document order. Unknown capability names
    /// yield an empty slice rather than an error.
    pub fn hosts_with_capability(&self, capability: &str) -> &[String] {
        self.capabilities.hosts(capability)
    }

    pub fn capabilities(&self) -> &CapabilityIndex {
        &self.capabilities
    }

    pub fn all_host_names(&self) -> &[String] {
        &self.enums.host_names
    }

    pub fn all_group_names(&self) -> &[String] {
        &self.enums.group_names
    }

    pub fn normalized_host_names(&self) -> &[String] {
        &self.enums.normalized_host_names
    }

    pub fn enums(&self) -> &EnumProjection {
        &self.enums
    }

    /// `display name -> address` for every host in the group (nested groups
    /// included), the shape service adapters build their client tables from.
    pub fn group_addresses(&self, group_name: &str) -> InventoryResult<IndexMap<String, String>> {
        let hosts = self.hosts_in_group(group_name)?;
        hosts
            .iter()
            .map(|name| {
                let host = self.host(name)?;
                Ok((host.display_name(), host.address().to_string()))
            })
            .collect()
    }

    pub fn summary(&self) -> InventorySummary {
        InventorySummary {
            hosts: self.hosts.len(),
            groups: self.groups.len(),
            group_names: self.enums.group_names.clone(),
        }
    }
}

fn names(graph: &GroupGraph, groups: &[usize]) -> Vec<String> {
    groups.iter().map(|&g| graph.name(g).to_string()).collect()
}
