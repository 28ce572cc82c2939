use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{PoisonError, RwLock};

use crate::error::InventoryError;
use crate::inventory::pattern::{parse_pattern, PatternOp, Selector};
use crate::inventory::{Inventory, InventorySource};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryGroup {
    pub hosts: BTreeSet<String>,
    pub children: BTreeSet<String>,
    pub vars: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct InventoryData {
    hosts: BTreeMap<String, Map<String, Value>>,
    groups: BTreeMap<String, InventoryGroup>,
}

/// In-memory inventory. Mutations are visible to every later query.
#[derive(Debug, Default)]
pub struct StaticInventory {
    data: RwLock<InventoryData>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_group_hosts`](Self::add_group_hosts).
    pub fn with_group(self, group: &str, hosts: &[&str]) -> Self {
        self.add_group_hosts(group, hosts);
        self
    }

    pub fn with_host(self, host: &str) -> Self {
        self.add_host(host, Map::new());
        self
    }

    pub fn add_host(&self, host: &str, vars: Map<String, Value>) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.hosts.entry(host.to_string()).or_default().extend(vars);
    }

    pub fn remove_host(&self, host: &str) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.hosts.remove(host);
        for group in data.groups.values_mut() {
            group.hosts.remove(host);
        }
    }

    pub fn add_group_hosts(&self, group: &str, hosts: &[&str]) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for host in hosts {
            data.hosts.entry(host.to_string()).or_default();
        }
        data.groups
            .entry(group.to_string())
            .or_default()
            .hosts
            .extend(hosts.iter().map(|h| h.to_string()));
    }

    pub fn add_child_group(&self, parent: &str, child: &str) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.groups.entry(child.to_string()).or_default();
        data.groups
            .entry(parent.to_string())
            .or_default()
            .children
            .insert(child.to_string());
    }

    pub fn set_group_vars(&self, group: &str, vars: Map<String, Value>) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.groups.entry(group.to_string()).or_default().vars.extend(vars);
    }

    pub fn host_vars(&self, host: &str) -> Option<Map<String, Value>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.hosts.get(host).cloned()
    }

    pub fn group(&self, name: &str) -> Option<InventoryGroup> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.groups.get(name).cloned()
    }

    /// Build from `ansible-inventory --list` output.
    pub fn from_ansible_json(inventory_data: &Value) -> Result<Self, InventoryError> {
        let obj = inventory_data
            .as_object()
            .ok_or_else(|| InventoryError::InvalidJson {
                reason: "expected a JSON object at the top level".to_string(),
            })?;

        let inventory = Self::new();

        if let Some(hostvars) = inventory_data
            .get("_meta")
            .and_then(|meta| meta.get("hostvars"))
            .and_then(Value::as_object)
        {
            for (host_name, vars) in hostvars {
                inventory.add_host(host_name, vars.as_object().cloned().unwrap_or_default());
            }
        }

        for (group_name, group_data) in obj {
            if group_name == "_meta" {
                continue;
            }

            let names = |key: &str| -> Vec<String> {
                group_data
                    .get(key)
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default()
            };

            let hosts = names("hosts");
            let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
            inventory.add_group_hosts(group_name, &host_refs);

            for child in names("children") {
                inventory.add_child_group(group_name, &child);
            }

            if let Some(vars) = group_data.get("vars").and_then(Value::as_object) {
                inventory.set_group_vars(group_name, vars.clone());
            }
        }

        Ok(inventory)
    }

    /// Render as an Ansible YAML-plugin inventory document (JSON flavored).
    pub fn to_document(&self) -> Value {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);

        let hosts: Map<String, Value> = data
            .hosts
            .iter()
            .map(|(name, vars)| (name.clone(), Value::Object(vars.clone())))
            .collect();

        let mut children = Map::new();
        let mut all_vars = Map::new();
        for (name, group) in &data.groups {
            if name == "all" {
                all_vars = group.vars.clone();
                continue;
            }
            let group_hosts: Map<String, Value> = group
                .hosts
                .iter()
                .map(|h| (h.clone(), json!({})))
                .collect();
            let group_children: Map<String, Value> = group
                .children
                .iter()
                .map(|c| (c.clone(), json!({})))
                .collect();
            children.insert(
                name.clone(),
                json!({
                    "hosts": group_hosts,
                    "children": group_children,
                    "vars": group.vars,
                }),
            );
        }

        json!({
            "all": {
                "hosts": hosts,
                "children": children,
                "vars": all_vars,
            }
        })
    }

    fn group_members(data: &InventoryData, group: &str, visited: &mut HashSet<String>) -> BTreeSet<String> {
        let mut members = BTreeSet::new();
        if !visited.insert(group.to_string()) {
            return members;
        }
        if let Some(entry) = data.groups.get(group) {
            members.extend(entry.hosts.iter().cloned());
            for child in &entry.children {
                members.extend(Self::group_members(data, child, visited));
            }
        }
        members
    }

    fn select(data: &InventoryData, selector: &Selector) -> BTreeSet<String> {
        if matches!(selector, Selector::All) {
            return data.hosts.keys().cloned().collect();
        }

        let mut selected = BTreeSet::new();
        for group in data.groups.keys().filter(|g| selector.matches(g)) {
            selected.extend(Self::group_members(data, group, &mut HashSet::new()));
        }
        selected.extend(data.hosts.keys().filter(|h| selector.matches(h)).cloned());
        selected
    }

    pub fn resolve(&self, pattern: &str) -> Result<Vec<String>, InventoryError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: BTreeSet<String> = BTreeSet::new();

        for term in parse_pattern(pattern) {
            let selected = Self::select(&data, &term.selector()?);
            match term.op {
                PatternOp::Union => result.extend(selected),
                PatternOp::Intersect => result.retain(|h| selected.contains(h)),
                PatternOp::Exclude => result.retain(|h| !selected.contains(h)),
            }
        }

        Ok(result.into_iter().collect())
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn hosts(&self, pattern: &str) -> Result<Vec<String>, InventoryError> {
        self.resolve(pattern)
    }

    async fn groups(&self) -> Result<Vec<String>, InventoryError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut groups: BTreeSet<String> = data.groups.keys().cloned().collect();
        groups.insert("all".to_string());
        groups.insert("ungrouped".to_string());
        Ok(groups.into_iter().collect())
    }

    fn source(&self) -> InventorySource {
        InventorySource::Document(self.to_document())
    }
}
