//! Inventory document parser.
//!
//! Turns the raw YAML document into an ordered group/host representation.
//! Ordering follows the document everywhere: groups in first-declaration order,
//! hosts and vars in the order they were written.

use indexmap::IndexMap;
use serde_yaml::Value;
use tracing::warn;

use crate::error::{InventoryError, InventoryResult};

/// Flat variable map; iteration order is the order keys were first written.
pub type VarMap = IndexMap<String, String>;

/// One occurrence of a host under a group's `hosts` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub name: String,
    pub vars: VarMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDef {
    pub name: String,
    pub vars: VarMap,
    pub hosts: Vec<HostRecord>,
    pub children: Vec<String>,
}

impl GroupDef {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vars: VarMap::new(),
            hosts: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Parsed but unresolved inventory. Only built during a load.
#[derive(Debug, Clone, Default)]
pub struct InventoryDocument {
    groups: IndexMap<String, GroupDef>,
}

impl InventoryDocument {
    pub fn groups(&self) -> impl Iterator<Item = &GroupDef> {
        self.groups.values()
    }

    pub fn group(&self, name: &str) -> Option<&GroupDef> {
        self.groups.get(name)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Host names in first-seen document order, each listed once.
    pub fn host_names(&self) -> Vec<String> {
        let mut seen = IndexMap::new();
        for group in self.groups.values() {
            for host in &group.hosts {
                seen.entry(host.name.clone()).or_insert(());
            }
        }
        seen.into_keys().collect()
    }

    pub(crate) fn group_entry(&mut self, name: &str) -> &mut GroupDef {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| GroupDef::new(name))
    }
}

/// Parse an inventory document.
///
/// `required_host_vars` lists variables every host record must declare inline
/// (across all of its occurrences); a missing one is a `MalformedDocument`.
pub fn parse_document(
    bytes: &[u8],
    required_host_vars: &[String],
) -> InventoryResult<InventoryDocument> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| InventoryError::malformed(format!("inventory is not valid UTF-8: {}", e)))?;

    let mut doc = InventoryDocument::default();
    if is_blank(text) {
        return Ok(doc);
    }

    let root: Value =
        serde_yaml::from_str(text).map_err(|e| InventoryError::malformed(e.to_string()))?;

    match untag(&root) {
        Value::Null => {}
        Value::Mapping(groups) => {
            for (key, body) in groups {
                let name = group_name(key, "top level")?;
                parse_group(&mut doc, &name, body)?;
            }
        }
        other => {
            return Err(InventoryError::malformed(format!(
                "top level must be a mapping of group names, found {}",
                kind(other)
            )))
        }
    }

    check_required_vars(&doc, required_host_vars)?;
    Ok(doc)
}

fn parse_group(doc: &mut InventoryDocument, name: &str, body: &Value) -> InventoryResult<()> {
    doc.group_entry(name);

    let sections = match untag(body) {
        Value::Null => return Ok(()),
        Value::Mapping(sections) => sections,
        other => {
            return Err(InventoryError::malformed(format!(
                "group '{}' must be a mapping, found {}",
                name,
                kind(other)
            )))
        }
    };

    for (key, value) in sections {
        let Value::String(section) = untag(key) else {
            return Err(InventoryError::malformed(format!(
                "group '{}' has a non-string section key",
                name
            )));
        };
        match section.as_str() {
            "hosts" => {
                let hosts = parse_hosts(name, value)?;
                doc.group_entry(name).hosts.extend(hosts);
            }
            "vars" => {
                let vars = parse_vars(&format!("group '{}'", name), value)?;
                doc.group_entry(name).vars.extend(vars);
            }
            "children" => parse_children(doc, name, value)?,
            other => warn!(group = %name, section = %other, "Ignoring unknown inventory section"),
        }
    }
    Ok(())
}

fn parse_hosts(group: &str, value: &Value) -> InventoryResult<Vec<HostRecord>> {
    let hosts = match untag(value) {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(hosts) => hosts,
        other => {
            return Err(InventoryError::malformed(format!(
                "hosts of group '{}' must be a mapping, found {}",
                group,
                kind(other)
            )))
        }
    };

    let mut records = Vec::with_capacity(hosts.len());
    for (key, vars) in hosts {
        let Value::String(raw) = untag(key) else {
            return Err(InventoryError::malformed(format!(
                "group '{}' has a non-string host name",
                group
            )));
        };
        let name = normalize_host_key(raw);
        if name.is_empty() {
            return Err(InventoryError::malformed(format!(
                "group '{}' has an empty host name",
                group
            )));
        }
        let vars = parse_vars(&format!("host '{}'", name), vars)?;
        records.push(HostRecord { name, vars });
    }
    Ok(records)
}

fn parse_children(doc: &mut InventoryDocument, parent: &str, value: &Value) -> InventoryResult<()> {
    match untag(value) {
        Value::Null => Ok(()),
        Value::Sequence(names) => {
            for item in names {
                let child = group_name(item, &format!("children of '{}'", parent))?;
                push_child(doc, parent, &child);
            }
            Ok(())
        }
        // Ansible form: `children: {name: {hosts: ..., vars: ...}}`
        Value::Mapping(nested) => {
            for (key, body) in nested {
                let child = group_name(key, &format!("children of '{}'", parent))?;
                push_child(doc, parent, &child);
                parse_group(doc, &child, body)?;
            }
            Ok(())
        }
        other => Err(InventoryError::malformed(format!(
            "children of group '{}' must be a list of group names, found {}",
            parent,
            kind(other)
        ))),
    }
}

fn push_child(doc: &mut InventoryDocument, parent: &str, child: &str) {
    let group = doc.group_entry(parent);
    if !group.children.iter().any(|c| c == child) {
        group.children.push(child.to_string());
    }
}

fn parse_vars(owner: &str, value: &Value) -> InventoryResult<VarMap> {
    let entries = match untag(value) {
        Value::Null => return Ok(VarMap::new()),
        Value::Mapping(entries) => entries,
        other => {
            return Err(InventoryError::malformed(format!(
                "vars of {} must be a mapping, found {}",
                owner,
                kind(other)
            )))
        }
    };

    let mut vars = VarMap::with_capacity(entries.len());
    for (key, value) in entries {
        let Value::String(key) = untag(key) else {
            return Err(InventoryError::malformed(format!(
                "{} has a non-string variable name",
                owner
            )));
        };
        vars.insert(key.clone(), scalar_text(owner, key, value)?);
    }
    Ok(vars)
}

/// Render a YAML value as the flat string stored in a var map.
fn scalar_text(owner: &str, key: &str, value: &Value) -> InventoryResult<String> {
    Ok(match untag(value) {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        complex => serde_json::to_string(complex).map_err(|e| {
            InventoryError::malformed(format!(
                "variable '{}' of {} cannot be flattened: {}",
                key, owner, e
            ))
        })?,
    })
}

fn check_required_vars(doc: &InventoryDocument, required: &[String]) -> InventoryResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    for host in doc.host_names() {
        let declares = |key: &str| {
            doc.groups()
                .flat_map(|g| g.hosts.iter())
                .filter(|record| record.name == host)
                .any(|record| record.vars.contains_key(key))
        };
        if let Some(missing) = required.iter().find(|key| !declares(key)) {
            return Err(InventoryError::malformed(format!(
                "host '{}' is missing required variable '{}'",
                host, missing
            )));
        }
    }
    Ok(())
}

fn group_name(key: &Value, context: &str) -> InventoryResult<String> {
    match untag(key) {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(InventoryError::malformed(format!(
            "empty group name in {}",
            context
        ))),
        other => Err(InventoryError::malformed(format!(
            "group names must be strings, found {} in {}",
            kind(other),
            context
        ))),
    }
}

/// Host names are unique case-insensitively.
pub(crate) fn normalize_host_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn is_blank(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> InventoryResult<InventoryDocument> {
        parse_document(yaml.as_bytes(), &[])
    }

    #[test]
    fn test_parse_flat_group() {
        let doc = parse(
            r#"
docker_hosts:
  hosts:
    alpha:
      ansible_host: 10.0.0.5
      docker_api_port: 2375
    Beta:
  vars:
    env: lab
"#,
        )
        .unwrap();

        let group = doc.group("docker_hosts").unwrap();
        assert_eq!(group.hosts.len(), 2);
        assert_eq!(group.hosts[0].name, "alpha");
        assert_eq!(group.hosts[0].vars.get("docker_api_port").unwrap(), "2375");
        assert_eq!(group.hosts[1].name, "beta");
        assert!(group.hosts[1].vars.is_empty());
        assert_eq!(group.vars.get("env").unwrap(), "lab");
        assert_eq!(doc.host_names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_parse_missing_sections_is_empty_group() {
        let doc = parse("edge:\nempty: {}\n").unwrap();
        assert_eq!(doc.group_count(), 2);
        let edge = doc.group("edge").unwrap();
        assert!(edge.hosts.is_empty() && edge.vars.is_empty() && edge.children.is_empty());
    }

    #[test]
    fn test_parse_empty_document() {
        assert_eq!(parse("").unwrap().group_count(), 0);
        assert_eq!(parse("# nothing here\n---\n").unwrap().group_count(), 0);
    }

    #[test]
    fn test_parse_children_list_and_mapping() {
        let doc = parse(
            r#"
homelab:
  children: [containers, dns]
containers:
  children:
    docker_hosts:
      hosts:
        alpha:
    podman_hosts:
"#,
        )
        .unwrap();

        assert_eq!(
            doc.group("homelab").unwrap().children,
            vec!["containers", "dns"]
        );
        assert_eq!(
            doc.group("containers").unwrap().children,
            vec!["docker_hosts", "podman_hosts"]
        );
        assert_eq!(doc.group("docker_hosts").unwrap().hosts[0].name, "alpha");
        // "dns" is only referenced, never declared
        assert!(doc.group("dns").is_none());
    }

    #[test]
    fn test_parse_value_flattening() {
        let doc = parse(
            r#"
g:
  vars:
    enabled: true
    ratio: 1.5
    nothing:
    tags: [a, b]
    nested: {k: v}
"#,
        )
        .unwrap();
        let vars = &doc.group("g").unwrap().vars;
        assert_eq!(vars["enabled"], "true");
        assert_eq!(vars["ratio"], "1.5");
        assert_eq!(vars["nothing"], "");
        assert_eq!(vars["tags"], r#"["a","b"]"#);
        assert_eq!(vars["nested"], r#"{"k":"v"}"#);
        let keys: Vec<_> = vars.keys().cloned().collect();
        assert_eq!(keys, vec!["enabled", "ratio", "nothing", "tags", "nested"]);
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        let cases = [
            "- a\n- b\n",
            "g: just-a-string\n",
            "g:\n  hosts: [alpha, beta]\n",
            "g:\n  vars: [1, 2]\n",
            "g:\n  children: web\n",
            "g:\n  hosts:\n    1: {}\n",
            "123:\n  hosts: {}\n",
            "g:\n  children: [1]\n",
            "g:\n  hosts:\n    alpha: 5\n",
            "g: {hosts: {alpha: {",
        ];
        for yaml in cases {
            assert!(
                matches!(parse(yaml), Err(InventoryError::MalformedDocument(_))),
                "expected MalformedDocument for {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        let err = parse_document(&[0x67, 0x3a, 0xff, 0xfe], &[]).unwrap_err();
        assert!(matches!(err, InventoryError::MalformedDocument(_)));
    }

    #[test]
    fn test_parse_ignores_unknown_section() {
        let doc = parse("g:\n  metadata: {owner: me}\n  vars: {a: 1}\n").unwrap();
        assert_eq!(doc.group("g").unwrap().vars["a"], "1");
    }

    #[test]
    fn test_required_vars_union_across_records() {
        let yaml = r#"
a:
  hosts:
    alpha: {ansible_host: 10.0.0.1}
b:
  hosts:
    alpha: {ansible_user: root}
"#;
        let required = vec!["ansible_host".to_string(), "ansible_user".to_string()];
        assert!(parse_document(yaml.as_bytes(), &required).is_ok());

        let required = vec!["ansible_port".to_string()];
        let err = parse_document(yaml.as_bytes(), &required).unwrap_err();
        assert_eq!(
            err,
            InventoryError::MalformedDocument(
                "host 'alpha' is missing required variable 'ansible_port'".to_string()
            )
        );
    }

    #[test]
    fn test_group_declared_twice_is_merged() {
        let doc = parse(
            r#"
parent:
  children:
    web:
      vars: {tier: front}
web:
  hosts:
    www1:
"#,
        )
        .unwrap();
        let web = doc.group("web").unwrap();
        assert_eq!(web.vars["tier"], "front");
        assert_eq!(web.hosts[0].name, "www1");
    }
}
