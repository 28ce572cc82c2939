use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{AdhocError, Result};
use crate::inventory::search_path;

pub const CONFIG_FILE_NAME: &str = "rustle-adhoc.yml";

/// Session-wide settings handed to the dispatcher and the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub forks: usize,
    pub no_log: bool,
    /// `None` leaves the engine's own default in place.
    pub host_key_checking: Option<bool>,
    pub private_key_file: Option<PathBuf>,
    pub verbose: bool,
    pub free_form_modules: BTreeSet<String>,
    pub ansible_command: String,
    pub inventory_command: String,
    pub environment: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            forks: 10,
            no_log: true,
            host_key_checking: None,
            private_key_file: None,
            verbose: true,
            free_form_modules: ["command", "shell", "script"]
                .into_iter()
                .map(String::from)
                .collect(),
            ansible_command: "ansible".to_string(),
            inventory_command: "ansible-inventory".to_string(),
            environment: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Load a YAML or JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdhocError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
            .map_err(|e| AdhocError::config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn from_yaml_str(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Looks for `rustle-adhoc.yml` in the current directory and its
    /// ancestors, then in the user config directory. Falls back to defaults.
    pub fn discover() -> Result<Self> {
        if let Some(path) = search_path(CONFIG_FILE_NAME) {
            tracing::debug!("Using session config {}", path.display());
            return Self::from_file(path);
        }

        if let Some(path) = dirs::config_dir().map(|d| d.join("rustle-adhoc").join("config.yml")) {
            if path.exists() {
                tracing::debug!("Using session config {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn is_free_form(&self, module: &str) -> bool {
        self.free_form_modules.contains(module)
    }
}
