//! Per-host variable merging.
//!
//! Precedence, lowest to highest (later writes win):
//! 1. the `all` group, wherever it is declared
//! 2. groups the host only inherits through nesting, farthest first
//! 3. groups the host is listed in directly, in declaration order
//! 4. the host's own inline vars, in document order
//!
//! Groups inherited at equal depth are applied in declaration order.

use std::{cmp::Reverse, collections::HashMap};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{InventoryError, InventoryResult},
    graph::{Ancestor, GroupGraph, ALL_GROUP},
    parser::{InventoryDocument, VarMap},
    projection::normalize_host_name,
};

/// Fully merged view of one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedHostConfig {
    name: String,
    vars: VarMap,
    direct_groups: Vec<String>,
    groups: Vec<String>,
}

impl MergedHostConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn has_var(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Groups listing this host in their `hosts` section, in declaration order.
    pub fn direct_groups(&self) -> &[String] {
        &self.direct_groups
    }

    /// Every group the host belongs to: direct groups first, then inherited
    /// ones nearest first.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Address adapters should connect to: `ansible_host`, else the host name.
    pub fn address(&self) -> &str {
        self.var("ansible_host")
            .filter(|addr| !addr.is_empty())
            .unwrap_or(&self.name)
    }

    /// Parse a port variable, falling back to `default` when absent or invalid.
    pub fn port(&self, key: &str, default: u16) -> u16 {
        match self.var(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(host = %self.name, key, value = raw, default, "Invalid port, using default");
                default
            }),
        }
    }

    pub fn display_name(&self) -> String {
        normalize_host_name(&self.name)
    }
}

#[derive(Default)]
struct Membership<'a> {
    direct: Vec<usize>,
    inline: Vec<&'a VarMap>,
}

/// Merge variables for every host in `doc`, keyed by host name in first-seen order.
///
/// `graph` must have been built from this same document.
pub fn merge_hosts(
    doc: &InventoryDocument,
    graph: &GroupGraph,
) -> InventoryResult<IndexMap<String, MergedHostConfig>> {
    let mut group_vars: Vec<&VarMap> = Vec::with_capacity(graph.len());
    let mut members: IndexMap<&str, Membership<'_>> = IndexMap::new();

    for group in doc.groups() {
        let index = graph.index_of(&group.name).ok_or_else(|| {
            InventoryError::Resolution(format!("group '{}' missing from graph", group.name))
        })?;
        if index != group_vars.len() {
            return Err(InventoryError::Resolution(format!(
                "group '{}' is out of declaration order",
                group.name
            )));
        }
        group_vars.push(&group.vars);

        for record in &group.hosts {
            let entry = members.entry(record.name.as_str()).or_default();
            if entry.direct.last() != Some(&index) {
                entry.direct.push(index);
            }
            entry.inline.push(&record.vars);
        }
    }

    let all = graph.index_of(ALL_GROUP);
    let not_all = |group: usize| Some(group) != all;

    let mut merged = IndexMap::with_capacity(members.len());
    for (name, membership) in members {
        let inherited = inherited_groups(graph, &membership.direct, all);

        let mut vars = VarMap::new();
        let layers = all
            .map(|g| group_vars[g])
            .into_iter()
            .chain(
                inherited
                    .iter()
                    .rev()
                    .filter(|a| not_all(a.group))
                    .map(|a| group_vars[a.group]),
            )
            .chain(
                membership
                    .direct
                    .iter()
                    .filter(|&&g| not_all(g))
                    .map(|&g| group_vars[g]),
            )
            .chain(membership.inline.iter().copied());
        for layer in layers {
            for (key, value) in layer {
                vars.insert(key.clone(), value.clone());
            }
        }

        let direct_groups: Vec<String> = membership
            .direct
            .iter()
            .map(|&g| graph.name(g).to_string())
            .collect();
        let groups = direct_groups
            .iter()
            .cloned()
            .chain(inherited.iter().map(|a| graph.name(a.group).to_string()))
            .collect();

        debug!(
            host = %name,
            direct = membership.direct.len(),
            inherited = inherited.len(),
            vars = vars.len(),
            "Merged host variables"
        );
        merged.insert(
            name.to_string(),
            MergedHostConfig {
                name: name.to_string(),
                vars,
                direct_groups,
                groups,
            },
        );
    }
    Ok(merged)
}

/// Groups reaching the host only through nesting, nearest first, with `all`
/// always last.
fn inherited_groups(graph: &GroupGraph, direct: &[usize], all: Option<usize>) -> Vec<Ancestor> {
    let mut depth: HashMap<usize, usize> = HashMap::new();
    for &group in direct {
        for ancestor in graph.ancestors(group) {
            if direct.contains(&ancestor.group) {
                continue;
            }
            depth
                .entry(ancestor.group)
                .and_modify(|d| *d = (*d).min(ancestor.depth))
                .or_insert(ancestor.depth);
        }
    }
    let mut inherited: Vec<Ancestor> = depth
        .into_iter()
        .map(|(group, depth)| Ancestor { group, depth })
        .collect();
    // Nearest first; at equal depth the later-declared group sorts first so
    // that, applied in reverse, it writes last.
    inherited.sort_by_key(|a| (Some(a.group) == all, a.depth, Reverse(a.group)));
    inherited
}
