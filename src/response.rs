//! Aggregated view over one module run across many hosts.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Index;

/// Raw result the engine reported for one host.
pub type HostResult = Map<String, Value>;

static EMPTY_RESULT: Lazy<HostResult> = Lazy::new(Map::new);

/// Results split by whether the engine reached the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub contacted: BTreeMap<String, HostResult>,
    pub dark: BTreeMap<String, HostResult>,
}

/// Per-host results of a module call plus counts derived once at
/// construction.
///
/// ```
/// use rustle_adhoc::response::{EngineOutput, ModuleResponse};
/// use serde_json::json;
///
/// let mut output = EngineOutput::default();
/// output.contacted.insert("h1".into(), json!({"changed": true}).as_object().unwrap().clone());
/// output.dark.insert("h2".into(), json!({"failed": true}).as_object().unwrap().clone());
///
/// let response = ModuleResponse::new(output);
/// assert_eq!(response.total_count(), 2);
/// assert_eq!(response.ok_count(), 1);
/// assert!(!response.all_ok());
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ModuleResponse {
    contacted: BTreeMap<String, HostResult>,
    dark: BTreeMap<String, HostResult>,
    facts: BTreeMap<String, Map<String, Value>>,
    total_count: usize,
    err_count: usize,
    ok_count: usize,
    changed_count: usize,
}

impl ModuleResponse {
    pub fn new(output: EngineOutput) -> Self {
        let EngineOutput { contacted, dark } = output;

        let facts = contacted
            .iter()
            .map(|(host, result)| {
                let host_facts = match result.get("ansible_facts") {
                    Some(Value::Object(facts)) => facts.clone(),
                    Some(other) => {
                        tracing::warn!("Ignoring non-map ansible_facts from {}: {}", host, other);
                        Map::new()
                    }
                    None => Map::new(),
                };
                (host.clone(), host_facts)
            })
            .collect();

        let all_results = || contacted.values().chain(dark.values());
        let total_count = contacted.len() + dark.len();
        let err_count = all_results().filter(|r| flag(r, "failed")).count();
        let changed_count = all_results().filter(|r| flag(r, "changed")).count();

        Self {
            total_count,
            err_count,
            ok_count: total_count - err_count,
            changed_count,
            contacted,
            dark,
            facts,
        }
    }

    pub fn contacted(&self) -> &BTreeMap<String, HostResult> {
        &self.contacted
    }

    pub fn dark(&self) -> &BTreeMap<String, HostResult> {
        &self.dark
    }

    /// `ansible_facts` reported by each contacted host.
    pub fn facts(&self) -> &BTreeMap<String, Map<String, Value>> {
        &self.facts
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn err_count(&self) -> usize {
        self.err_count
    }

    pub fn ok_count(&self) -> usize {
        self.ok_count
    }

    pub fn changed_count(&self) -> usize {
        self.changed_count
    }

    pub fn all_ok(&self) -> bool {
        self.err_count == 0
    }

    pub fn some_ok(&self) -> bool {
        self.all_ok() || self.ok_count > 0
    }

    pub fn none_ok(&self) -> bool {
        self.ok_count == 0 && self.err_count > 0
    }

    /// True when no host succeeded, not when every host failed. An empty
    /// response is therefore not "all failed".
    pub fn all_failed(&self) -> bool {
        self.none_ok()
    }

    pub fn some_failed(&self) -> bool {
        self.err_count > 0
    }

    pub fn none_failed(&self) -> bool {
        self.all_ok()
    }

    pub fn all_changed(&self) -> bool {
        self.total_count == self.changed_count
    }

    pub fn some_changed(&self) -> bool {
        self.changed_count > 0
    }

    pub fn none_changed(&self) -> bool {
        self.changed_count == 0
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Number of hosts without a failure. Can be zero with no failures
    /// when nothing was targeted.
    pub fn success_count(&self) -> usize {
        self.ok_count
    }

    pub fn success(&self) -> bool {
        self.all_ok()
    }

    pub fn failed(&self) -> bool {
        self.all_failed()
    }

    /// Result for `host`, whether or not it was reached. Unknown hosts yield
    /// an empty map.
    pub fn get(&self, host: &str) -> &HostResult {
        self.contacted
            .get(host)
            .or_else(|| self.dark.get(host))
            .unwrap_or(&EMPTY_RESULT)
    }

    /// Every host the engine tried, reached or not, sorted.
    pub fn hosts(&self) -> Vec<String> {
        self.contacted
            .keys()
            .chain(self.dark.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl Index<&str> for ModuleResponse {
    type Output = HostResult;

    fn index(&self, host: &str) -> &HostResult {
        self.get(host)
    }
}

impl fmt::Display for ModuleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sections = Vec::new();
        for host in self.hosts() {
            sections.push(format!("\n---- {host}: "));
            let sorted: BTreeMap<&String, &Value> = self.get(&host).iter().collect();
            let body = serde_json::to_string_pretty(&sorted).map_err(|_| fmt::Error)?;
            sections.push(body);
        }
        write!(f, "{}", sections.join("\n"))
    }
}

/// Truthiness of `result[key]`: `false`, `0`, `null` and empty strings,
/// arrays or maps are false, everything else is true.
fn flag(result: &HostResult, key: &str) -> bool {
    match result.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}
