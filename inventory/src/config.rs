//! Resolver configuration.
//!
//! Loaded from YAML and/or the environment. Environment variables use the
//! names the homelab adapters have always read, so existing `.env` files keep
//! working.

use std::{path::PathBuf, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    cache::{CacheMode, InventoryHandle},
    capability::{CapabilityTable, Predicate},
    error::{InventoryError, InventoryResult},
    snapshot::ResolveOptions,
    source::FileSource,
};

pub const ENV_INVENTORY_PATH: &str = "ANSIBLE_INVENTORY_PATH";
pub const ENV_CACHE_MODE: &str = "INVENTORY_CACHE_MODE";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InventoryConfig {
    /// Inventory document location
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Cache lifetime for handles opened from this config
    #[serde(default)]
    pub mode: CacheMode,

    /// Variables every host record must declare inline
    #[serde(default)]
    pub required_host_vars: Vec<String>,

    /// Group names the built-in capabilities look for
    #[serde(default)]
    pub groups: CapabilityGroups,

    /// Extra capabilities; a built-in name here replaces the built-in predicate
    #[serde(default)]
    pub capabilities: IndexMap<String, Predicate>,
}

/// Inventory group that marks each built-in capability.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CapabilityGroups {
    #[serde(default = "default_docker_group")]
    pub docker: String,
    #[serde(default = "default_podman_group")]
    pub podman: String,
    #[serde(default = "default_ollama_group")]
    pub ollama: String,
    #[serde(default = "default_pihole_group")]
    pub pihole: String,
    #[serde(default = "default_ups_group")]
    pub ups: String,
    #[serde(default = "default_unifi_group")]
    pub unifi: String,
}

fn default_docker_group() -> String {
    "docker_hosts".to_string()
}

fn default_podman_group() -> String {
    "podman_hosts".to_string()
}

fn default_ollama_group() -> String {
    "ollama_servers".to_string()
}

fn default_pihole_group() -> String {
    "PiHole".to_string()
}

fn default_ups_group() -> String {
    "nut_servers".to_string()
}

fn default_unifi_group() -> String {
    "unifi_controllers".to_string()
}

impl Default for CapabilityGroups {
    fn default() -> Self {
        Self {
            docker: default_docker_group(),
            podman: default_podman_group(),
            ollama: default_ollama_group(),
            pihole: default_pihole_group(),
            ups: default_ups_group(),
            unifi: default_unifi_group(),
        }
    }
}

impl InventoryConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> InventoryResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| InventoryError::SourceNotFound {
                location: path.to_string(),
                reason: e.to_string(),
            })?;
        serde_yaml::from_str(&content)
            .map_err(|e| InventoryError::malformed(format!("config {}: {}", path, e)))
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = lookup(ENV_INVENTORY_PATH) {
            self.path = Some(PathBuf::from(path));
        }
        if let Some(mode) = lookup(ENV_CACHE_MODE) {
            match mode.trim().to_ascii_lowercase().as_str() {
                "shared" => self.mode = CacheMode::Shared,
                "isolated" => self.mode = CacheMode::Isolated,
                other => warn!(value = other, "Ignoring unknown {}", ENV_CACHE_MODE),
            }
        }

        let groups = &mut self.groups;
        for (var, slot) in [
            ("DOCKER_ANSIBLE_GROUP", &mut groups.docker),
            ("PODMAN_ANSIBLE_GROUP", &mut groups.podman),
            ("OLLAMA_INVENTORY_GROUP", &mut groups.ollama),
            ("PIHOLE_ANSIBLE_GROUP", &mut groups.pihole),
            ("NUT_ANSIBLE_GROUP", &mut groups.ups),
            ("UNIFI_ANSIBLE_GROUP", &mut groups.unifi),
        ] {
            if let Some(group) = lookup(var) {
                *slot = group.trim().to_string();
            }
        }
        self
    }

    pub fn source(&self) -> InventoryResult<FileSource> {
        self.path
            .as_ref()
            .map(FileSource::new)
            .ok_or_else(|| InventoryError::SourceNotFound {
                location: ENV_INVENTORY_PATH.to_string(),
                reason: "no inventory path configured".to_string(),
            })
    }

    /// Built-in capabilities followed by configured extras.
    pub fn capability_table(&self) -> CapabilityTable {
        self.capabilities
            .iter()
            .fold(CapabilityTable::builtin(&self.groups), |table, (name, pred)| {
                table.with(name.clone(), pred.clone())
            })
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            required_host_vars: self.required_host_vars.clone(),
            capabilities: self.capability_table(),
        }
    }

    /// Open a handle for the configured inventory without loading it.
    pub fn open(&self) -> InventoryResult<InventoryHandle> {
        let source = Arc::new(self.source()?);
        Ok(InventoryHandle::open(self.mode, source, self.resolve_options()))
    }
}
