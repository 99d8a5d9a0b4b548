//! Enum projections for tool-parameter schemas.
//!
//! Everything here is a pure function of already-resolved data.

use std::{collections::BTreeSet, net::IpAddr};

use indexmap::IndexMap;
use serde::Serialize;

use crate::capability::CapabilityIndex;

/// Sorted, duplicate-free value lists derived from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EnumProjection {
    pub host_names: Vec<String>,
    pub group_names: Vec<String>,
    /// Capability name (table order) -> sorted host names.
    pub capabilities: IndexMap<String, Vec<String>>,
    /// Host name -> normalized identifier, keyed in host-name order.
    pub normalized: IndexMap<String, String>,
    /// Sorted unique normalized identifiers.
    pub normalized_host_names: Vec<String>,
}

impl EnumProjection {
    pub fn project<'a>(
        hosts: impl IntoIterator<Item = &'a str>,
        groups: impl IntoIterator<Item = &'a str>,
        capabilities: &CapabilityIndex,
    ) -> Self {
        let host_names = sorted_unique(hosts);
        let group_names = sorted_unique(groups);
        let capabilities = capabilities
            .iter()
            .map(|(name, hosts)| {
                (
                    name.to_string(),
                    sorted_unique(hosts.iter().map(String::as_str)),
                )
            })
            .collect();
        let normalized: IndexMap<String, String> = host_names
            .iter()
            .map(|host| (host.clone(), normalize_host_name(host)))
            .collect();
        let normalized_host_names = sorted_unique(
            normalized
                .values()
                .map(String::as_str)
                .filter(|n| !n.is_empty()),
        );

        Self {
            host_names,
            group_names,
            capabilities,
            normalized,
            normalized_host_names,
        }
    }

    /// Sorted hosts for `capability`; empty for unknown names.
    pub fn capability(&self, capability: &str) -> &[String] {
        self.capabilities
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn sorted_unique<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Identifier-safe form of a host name: first DNS label, lower-cased,
/// `_` turned into `-`, anything outside `[a-z0-9-]` dropped.
///
/// IP literals keep every octet (`10.0.0.5` -> `10-0-0-5`).
pub fn normalize_host_name(name: &str) -> String {
    let name = name.trim();
    let base = if name.parse::<IpAddr>().is_ok() {
        name.replace(['.', ':'], "-")
    } else {
        name.split('.').next().unwrap_or(name).to_string()
    };
    base.to_lowercase()
        .chars()
        .map(|c| if c == '_' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
