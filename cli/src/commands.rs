//! Subcommand renderers. Each returns the text to print so output can be
//! checked without a terminal.

use std::fmt::Write;

use anyhow::{Context, Result};
use homelab_inventory::Snapshot;
use serde_json::json;

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

fn to_json(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize output")
}

pub fn check(snapshot: &Snapshot, output: Output) -> Result<String> {
    let summary = snapshot.summary();
    if output.json {
        return to_json(&json!({
            "ok": true,
            "source": snapshot.source(),
            "generation": snapshot.generation(),
            "loaded_at": snapshot.loaded_at(),
            "summary": summary,
        }));
    }
    Ok(format!(
        "OK {}: {} hosts, {} groups",
        snapshot.source(),
        summary.hosts,
        summary.groups
    ))
}

pub fn hosts(
    snapshot: &Snapshot,
    group: Option<&str>,
    capability: Option<&str>,
    output: Output,
) -> Result<String> {
    let names: Vec<&str> = match (group, capability) {
        (Some(group), _) => snapshot
            .hosts_in_group(group)?
            .iter()
            .map(String::as_str)
            .collect(),
        (None, Some(capability)) => snapshot
            .hosts_with_capability(capability)
            .iter()
            .map(String::as_str)
            .collect(),
        (None, None) => snapshot.hosts().map(|h| h.name()).collect(),
    };

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let host = snapshot.host(name)?;
        rows.push((host.name(), host.display_name(), host.address()));
    }

    if output.json {
        let items: Vec<_> = rows
            .iter()
            .map(|(name, display, address)| {
                json!({"name": name, "display_name": display, "address": address})
            })
            .collect();
        return to_json(&items);
    }

    let mut out = String::new();
    for (name, display, address) in rows {
        writeln!(out, "{:<32} {:<20} {}", name, display, address)?;
    }
    Ok(out.trim_end().to_string())
}

pub fn groups(snapshot: &Snapshot, output: Output) -> Result<String> {
    if output.json {
        let groups: Vec<_> = snapshot.groups().collect();
        return to_json(&groups);
    }

    let mut out = String::new();
    for group in snapshot.groups() {
        writeln!(
            out,
            "{} ({} hosts, {} direct)",
            group.name,
            group.hosts.len(),
            group.direct_hosts.len()
        )?;
        if !group.parents.is_empty() {
            writeln!(out, "  parents:  {}", group.parents.join(", "))?;
        }
        if !group.children.is_empty() {
            writeln!(out, "  children: {}", group.children.join(", "))?;
        }
    }
    Ok(out.trim_end().to_string())
}

pub fn host(snapshot: &Snapshot, name: &str, output: Output) -> Result<String> {
    let host = snapshot.host(name)?;
    if output.json {
        return to_json(host);
    }

    let mut out = String::new();
    writeln!(out, "{} ({})", host.name(), host.address())?;
    writeln!(out, "groups: {}", host.groups().join(", "))?;
    for (key, value) in host.vars() {
        writeln!(out, "  {} = {}", key, value)?;
    }
    Ok(out.trim_end().to_string())
}

pub fn capabilities(snapshot: &Snapshot, output: Output) -> Result<String> {
    if output.json {
        return to_json(snapshot.capabilities());
    }

    let mut out = String::new();
    for (name, hosts) in snapshot.capabilities().iter() {
        let listed = if hosts.is_empty() {
            "-".to_string()
        } else {
            hosts.join(", ")
        };
        writeln!(out, "{:<20} {}", name, listed)?;
    }
    Ok(out.trim_end().to_string())
}

pub fn enums(snapshot: &Snapshot, output: Output) -> Result<String> {
    let enums = snapshot.enums();
    if output.json {
        return to_json(enums);
    }

    let mut out = String::new();
    writeln!(out, "hosts: {}", enums.host_names.join(", "))?;
    writeln!(out, "groups: {}", enums.group_names.join(", "))?;
    writeln!(out, "normalized: {}", enums.normalized_host_names.join(", "))?;
    for (name, hosts) in &enums.capabilities {
        writeln!(out, "capability {}: {}", name, hosts.join(", "))?;
    }
    Ok(out.trim_end().to_string())
}
