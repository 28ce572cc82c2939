//! Scriptable sessions: run modules against a host pattern while keeping
//! facts and variables per host.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SessionConfig;
use crate::engine::{AnsibleEngine, ModuleEngine};
use crate::error::{AdhocError, Result};
use crate::inventory::{scoped_pattern, AnsibleInventory, Inventory};
use crate::invocation::{CallArgs, Invocation, RunnerOptions};
use crate::response::ModuleResponse;
use crate::store::HostStore;
use crate::template::TemplateRenderer;
use crate::variables::{layer_order, VarsSource};

/// A pattern-scoped handle on an inventory.
///
/// ```no_run
/// use rustle_adhoc::{CallArgs, Session, SessionConfig};
///
/// # async fn demo() -> rustle_adhoc::Result<()> {
/// let session = Session::open("inventory.ini", SessionConfig::default()).await?;
/// assert!(session.invoke("ping", CallArgs::new()).await?.all_ok());
///
/// session
///     .filter("db-servers")
///     .invoke("apt", CallArgs::new().arg("mysql-server").kwarg("state", "present"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    inventory: Arc<dyn Inventory>,
    engine: Arc<dyn ModuleEngine>,
    config: SessionConfig,
    /// Patterns a host must match, one per filter level.
    scope: Vec<String>,
    pattern: String,
    facts: HostStore,
    vars: HostStore,
    last: Mutex<Option<ModuleResponse>>,
}

impl Session {
    /// Session over every host of a pre-built inventory.
    pub async fn new(
        inventory: Arc<dyn Inventory>,
        engine: Arc<dyn ModuleEngine>,
        config: SessionConfig,
    ) -> Result<Self> {
        let session = Self {
            inventory,
            engine,
            config,
            scope: vec!["all".to_string()],
            pattern: "all".to_string(),
            facts: HostStore::new(),
            vars: HostStore::new(),
            last: Mutex::new(None),
        };

        for host in session.hosts().await? {
            session
                .facts
                .set(&host, "ansible_hostname", Value::String(host.clone()));
        }

        Ok(session)
    }

    /// Session over an inventory file, searched for in the current directory
    /// and its ancestors, executed through the `ansible` command.
    pub async fn open(inventory: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        let inventory = AnsibleInventory::open(inventory, &config).await?;
        let engine = AnsibleEngine::new(&config)?;
        Self::new(Arc::new(inventory), Arc::new(engine), config).await
    }

    /// Apply `vars` to every host, as `initvars({"all": vars})`.
    pub async fn with_default_vars(self, vars: Map<String, Value>) -> Result<Self> {
        let mut layers = BTreeMap::new();
        layers.insert("all".to_string(), vars);
        self.initvars(layers).await?;
        Ok(self)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Narrow to hosts that are in scope and match `pattern`, while sharing
    /// facts and variables with `self`. The terms of `pattern` combine among
    /// themselves before the intersection with the scope.
    pub fn filter(&self, pattern: &str) -> Session {
        let mut scope = self.scope.clone();
        scope.push(pattern.to_string());

        Session {
            inventory: Arc::clone(&self.inventory),
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            scope,
            pattern: scoped_pattern(&self.pattern, pattern),
            facts: self.facts.clone(),
            vars: self.vars.clone(),
            last: Mutex::new(None),
        }
    }

    pub fn fact_store(&self) -> &HostStore {
        &self.facts
    }

    pub fn var_store(&self) -> &HostStore {
        &self.vars
    }

    /// Host names in scope.
    pub async fn hosts(&self) -> Result<Vec<String>> {
        resolve_scope(self.inventory.as_ref(), &self.scope, None).await
    }

    /// Host names in scope that also match `pattern`.
    pub async fn hosts_matching(&self, pattern: &str) -> Result<Vec<String>> {
        resolve_scope(self.inventory.as_ref(), &self.scope, Some(pattern)).await
    }

    pub async fn groups(&self) -> Result<Vec<String>> {
        Ok(self.inventory.groups().await?)
    }

    /// Facts known for `host`.
    pub fn facts(&self, host: &str) -> Map<String, Value> {
        self.facts.host(host)
    }

    pub fn fact(&self, host: &str, name: &str) -> Option<Value> {
        self.facts.get(host, name)
    }

    pub fn task(&self, name: &str) {
        if self.config.verbose {
            tracing::info!("TASK[{}]: {}", self.pattern, name);
        }
    }

    pub fn set_private_key_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        self.config.private_key_file = Some(absolute);
        Ok(())
    }

    /// Returns the previous setting. Only affects this session and views
    /// filtered from it afterwards.
    pub fn set_host_key_checking(&mut self, enabled: bool) -> Option<bool> {
        self.config.host_key_checking.replace(enabled)
    }

    /// Load pattern-scoped variables. `all` applies first, then group
    /// patterns, then host names; later layers win.
    pub async fn initvars(&self, source: impl Into<VarsSource>) -> Result<()> {
        let layers = source.into().load()?;
        let hosts: BTreeSet<String> = self.hosts().await?.into_iter().collect();

        for pattern in layer_order(layers.keys(), &hosts) {
            let Some(values) = layers.get(&pattern) else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            for host in self.hosts_matching(&pattern).await? {
                self.vars.merge(&host, values.clone());
            }
        }

        Ok(())
    }

    /// Set `name` on every host in scope.
    pub async fn setvar(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        for host in self.hosts().await? {
            self.vars.set(&host, name, value.clone());
        }
        Ok(())
    }

    /// Set `name` per host for the in-scope hosts present in `host_vars`.
    pub async fn sethostvars(&self, name: &str, host_vars: &HashMap<String, Value>) -> Result<()> {
        for host in self.hosts().await? {
            if let Some(value) = host_vars.get(&host) {
                self.vars.set(&host, name, value.clone());
            }
        }
        Ok(())
    }

    pub fn hostvar(&self, host: &str, name: &str) -> Option<Value> {
        self.vars.get(host, name)
    }

    pub fn hostvar_or(&self, host: &str, name: &str, default: Value) -> Value {
        self.hostvar(host, name).unwrap_or(default)
    }

    pub fn hostvars(&self, host: &str) -> Map<String, Value> {
        self.vars.host(host)
    }

    /// Run `module` on the hosts matching this session's pattern.
    ///
    /// Host failures are reported in the response; only caller mistakes and
    /// engine breakdowns are errors.
    pub async fn invoke(&self, module: &str, mut args: CallArgs) -> Result<ModuleResponse> {
        let overrides = std::mem::take(&mut args.runner_overrides);
        let pattern_overridden = overrides.contains_key("pattern");
        let (module_args, complex_args) =
            args.into_module_args(module, self.config.is_free_form(module))?;

        let mut options = RunnerOptions::new(module, &self.pattern, &self.config);
        options.module_args = module_args;
        options.complex_args = complex_args;
        options.facts = self.facts.snapshot();
        options.vars = self.vars.snapshot();
        let options = options.with_overrides(&overrides)?;

        let inventory: Arc<dyn Inventory> = match &options.inventory {
            Some(path) => Arc::new(AnsibleInventory::open(path, &self.config).await?),
            None => Arc::clone(&self.inventory),
        };

        let hosts = if pattern_overridden {
            inventory.hosts(&options.pattern).await?
        } else {
            resolve_scope(inventory.as_ref(), &self.scope, None).await?
        };
        tracing::debug!(
            "Invoking {} on {} ({} hosts)",
            options.module_name,
            options.pattern,
            hosts.len()
        );

        let invocation = Invocation {
            options,
            hosts,
            inventory: inventory.source(),
            host_overrides: inventory.host_overrides(),
            environment: self.config.environment.clone(),
        };

        let output = self.engine.run(&invocation).await?;
        let response = ModuleResponse::new(output);

        for (host, facts) in response.facts() {
            if !facts.is_empty() {
                self.facts.merge(host, facts.clone());
            }
        }

        tracing::info!(
            "{}[{}]: ok={} changed={} failed={}",
            module,
            invocation.options.pattern,
            response.ok_count(),
            response.changed_count(),
            response.err_count()
        );

        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(response.clone());
        Ok(response)
    }

    /// Record facts on every host in scope through the `set_fact` module.
    pub async fn set_fact(&self, facts: Map<String, Value>) -> Result<ModuleResponse> {
        self.invoke("set_fact", CallArgs::new().kwargs(facts)).await
    }

    /// Most recent response produced by this session object.
    pub fn last(&self) -> Option<ModuleResponse> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Render a Jinja-style template once per in-scope host with that host's
    /// variables.
    pub async fn j2template(&self, template_file: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
        let path: PathBuf = template_file.as_ref().to_path_buf();
        let template = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| AdhocError::FileNotFound { path: path.clone() })?;

        let renderer = TemplateRenderer::new();
        let mut expansion = BTreeMap::new();
        for host in self.hosts().await? {
            let vars = Value::Object(self.hostvars(&host));
            expansion.insert(host, renderer.render(&template, &vars)?);
        }
        Ok(expansion)
    }
}

/// Hosts matching every scope level, and `extra` when given.
async fn resolve_scope(
    inventory: &dyn Inventory,
    scope: &[String],
    extra: Option<&str>,
) -> Result<Vec<String>> {
    let mut selected: Option<BTreeSet<String>> = None;

    for pattern in scope.iter().map(String::as_str).chain(extra) {
        let hosts: BTreeSet<String> = inventory.hosts(pattern).await?.into_iter().collect();
        selected = Some(match selected {
            Some(previous) => previous.intersection(&hosts).cloned().collect(),
            None => hosts,
        });
        if selected.as_ref().is_some_and(BTreeSet::is_empty) {
            break;
        }
    }

    Ok(selected.unwrap_or_default().into_iter().collect())
}
