//! Module invocation descriptors built from caller arguments.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::config::SessionConfig;
use crate::error::{AdhocError, Result};
use crate::inventory::InventorySource;

/// Arguments of a single module call: at most one positional value, any
/// number of keyword arguments, and runner option overrides.
///
/// ```
/// use rustle_adhoc::CallArgs;
///
/// let args = CallArgs::new()
///     .arg("mysql-server")
///     .kwarg("state", "present")
///     .runner_option("forks", 2);
/// assert_eq!(args.positional.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
    pub runner_overrides: Map<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(key.into(), value.into());
        self
    }

    pub fn kwargs(mut self, values: Map<String, Value>) -> Self {
        self.keyword.extend(values);
        self
    }

    pub fn runner_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.runner_overrides.insert(key.into(), value.into());
        self
    }

    pub fn runner_options(mut self, values: Map<String, Value>) -> Self {
        self.runner_overrides.extend(values);
        self
    }

    /// Split into the raw argument string and the structured arguments.
    /// Free-form modules take the positional verbatim, every other module
    /// gets it as `name`.
    pub fn into_module_args(
        self,
        module: &str,
        free_form: bool,
    ) -> Result<(Option<String>, Map<String, Value>)> {
        let CallArgs {
            mut positional,
            mut keyword,
            ..
        } = self;

        if positional.len() > 1 {
            return Err(AdhocError::TooManyPositional {
                module: module.to_string(),
                count: positional.len(),
            });
        }

        let mut module_args = None;
        if let Some(value) = positional.pop() {
            if free_form {
                module_args = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            } else {
                keyword.insert("name".to_string(), value);
            }
        }

        Ok((module_args, keyword))
    }
}

/// Everything the engine needs to know about a call. Callers may override
/// any field through [`CallArgs::runner_option`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerOptions {
    pub module_name: String,
    pub module_args: Option<String>,
    pub complex_args: Map<String, Value>,
    pub facts: HashMap<String, Map<String, Value>>,
    pub vars: HashMap<String, Map<String, Value>>,
    pub pattern: String,
    /// Inventory file to use instead of the session's.
    pub inventory: Option<PathBuf>,
    pub no_log: bool,
    pub forks: usize,
    pub private_key_file: Option<PathBuf>,
    pub host_key_checking: Option<bool>,
    #[serde(rename = "become")]
    pub become_: bool,
    pub become_user: Option<String>,
    pub remote_user: Option<String>,
    pub check: bool,
    pub diff: bool,
    pub timeout: Option<u64>,
}

impl RunnerOptions {
    pub fn new(module_name: &str, pattern: &str, config: &SessionConfig) -> Self {
        Self {
            module_name: module_name.to_string(),
            module_args: None,
            complex_args: Map::new(),
            facts: HashMap::new(),
            vars: HashMap::new(),
            pattern: pattern.to_string(),
            inventory: None,
            no_log: config.no_log,
            forks: config.forks,
            private_key_file: config.private_key_file.clone(),
            host_key_checking: config.host_key_checking,
            become_: false,
            become_user: None,
            remote_user: None,
            check: false,
            diff: false,
            timeout: None,
        }
    }

    /// Merge `overrides` key by key on top of these options.
    pub fn with_overrides(self, overrides: &Map<String, Value>) -> Result<Self> {
        if overrides.is_empty() {
            return Ok(self);
        }

        let mut value = serde_json::to_value(&self)?;
        if let Value::Object(fields) = &mut value {
            for (key, override_value) in overrides {
                fields.insert(key.clone(), override_value.clone());
            }
        }

        serde_json::from_value(value).map_err(|e| AdhocError::InvalidOverride {
            reason: e.to_string(),
        })
    }
}

/// A fully resolved call handed to a [`ModuleEngine`](crate::engine::ModuleEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub options: RunnerOptions,
    /// Hosts the pattern resolved to when the call was made.
    pub hosts: Vec<String>,
    pub inventory: InventorySource,
    pub host_overrides: HashMap<String, Map<String, Value>>,
    pub environment: BTreeMap<String, String>,
}

impl Invocation {
    /// Variables the engine should attach to `host`: facts, then session
    /// variables, then inventory overrides.
    pub fn host_vars(&self, host: &str) -> Map<String, Value> {
        let mut vars = Map::new();
        for layer in [&self.options.facts, &self.options.vars, &self.host_overrides] {
            if let Some(values) = layer.get(host) {
                vars.extend(values.clone());
            }
        }
        vars
    }
}
