use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::SessionConfig;
use crate::error::InventoryError;
use crate::inventory::{search_path, Inventory, InventorySource, StaticInventory};

const KEY_FILE_VARS: [&str; 2] = ["ansible_ssh_private_key_file", "ansible_private_key_file"];

/// Inventory file backed by the `ansible` tooling. Every query runs the
/// external tool again, so edits to the file are picked up between calls.
#[derive(Debug, Clone)]
pub struct AnsibleInventory {
    path: PathBuf,
    ansible: PathBuf,
    inventory_cmd: PathBuf,
    environment: BTreeMap<String, String>,
    host_overrides: HashMap<String, Map<String, Value>>,
}

impl AnsibleInventory {
    /// Locate `path` (current directory, then ancestors) and load it.
    pub async fn open(path: impl AsRef<Path>, config: &SessionConfig) -> Result<Self, InventoryError> {
        let requested = path.as_ref();
        let path = search_path(requested).ok_or_else(|| InventoryError::FileNotFound {
            path: requested.display().to_string(),
        })?;

        let mut inventory = Self {
            path,
            ansible: locate(&config.ansible_command)?,
            inventory_cmd: locate(&config.inventory_command)?,
            environment: config.environment.clone(),
            host_overrides: HashMap::new(),
        };

        let listing = inventory.list().await?;
        inventory.host_overrides = resolve_key_files(&listing);
        tracing::debug!(
            "Opened inventory {} ({} key file overrides)",
            inventory.path.display(),
            inventory.host_overrides.len()
        );

        Ok(inventory)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw `ansible-inventory --list` output.
    pub async fn list(&self) -> Result<Value, InventoryError> {
        let mut cmd = Command::new(&self.inventory_cmd);
        cmd.arg("-i").arg(&self.path).arg("--list");
        let stdout = self.run(cmd).await?;
        serde_json::from_str(&stdout).map_err(|e| InventoryError::InvalidJson {
            reason: e.to_string(),
        })
    }

    /// Point-in-time copy of the inventory as an in-memory one.
    pub async fn snapshot(&self) -> Result<StaticInventory, InventoryError> {
        StaticInventory::from_ansible_json(&self.list().await?)
    }

    async fn run(&self, mut cmd: Command) -> Result<String, InventoryError> {
        cmd.envs(&self.environment)
            .env("ANSIBLE_LOCALHOST_WARNING", "False")
            .kill_on_drop(true);
        tracing::debug!("Running {:?}", cmd.as_std());

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(InventoryError::CommandFailed {
                command: format!("{:?}", cmd.as_std()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Inventory for AnsibleInventory {
    async fn hosts(&self, pattern: &str) -> Result<Vec<String>, InventoryError> {
        let mut cmd = Command::new(&self.ansible);
        cmd.arg(pattern)
            .arg("-i")
            .arg(&self.path)
            .arg("--list-hosts");
        let stdout = self.run(cmd).await?;
        Ok(parse_list_hosts(&stdout))
    }

    async fn groups(&self) -> Result<Vec<String>, InventoryError> {
        let listing = self.list().await?;
        let mut groups: Vec<String> = listing
            .as_object()
            .map(|obj| obj.keys().filter(|k| *k != "_meta").cloned().collect())
            .unwrap_or_default();
        groups.sort();
        Ok(groups)
    }

    fn source(&self) -> InventorySource {
        InventorySource::Path(self.path.clone())
    }

    fn host_overrides(&self) -> HashMap<String, Map<String, Value>> {
        self.host_overrides.clone()
    }
}

fn locate(command: &str) -> Result<PathBuf, InventoryError> {
    which::which(command).map_err(|_| InventoryError::ExecutableNotFound {
        name: command.to_string(),
    })
}

/// Parse `ansible <pattern> --list-hosts` output:
///
/// ```text
///   hosts (2):
///     web01
///     web02
/// ```
pub fn parse_list_hosts(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !(line.starts_with("hosts (") && line.ends_with("):")))
        .filter(|line| !line.starts_with("[WARNING]"))
        .map(String::from)
        .collect()
}

/// Relative private key paths in host vars are resolved the same way as the
/// inventory file itself.
fn resolve_key_files(listing: &Value) -> HashMap<String, Map<String, Value>> {
    let mut overrides = HashMap::new();

    let Some(hostvars) = listing
        .get("_meta")
        .and_then(|meta| meta.get("hostvars"))
        .and_then(Value::as_object)
    else {
        return overrides;
    };

    for (host, vars) in hostvars {
        for key in KEY_FILE_VARS {
            let Some(file) = vars.get(key).and_then(Value::as_str) else {
                continue;
            };
            if Path::new(file).is_absolute() {
                continue;
            }
            match search_path(file) {
                Some(found) => {
                    overrides
                        .entry(host.clone())
                        .or_insert_with(Map::new)
                        .insert(key.to_string(), Value::String(found.display().to_string()));
                }
                None => tracing::warn!("Key file {} for host {} not found", file, host),
            }
        }
    }

    overrides
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_list_hosts() {
        let out = "  hosts (2):\n    web01\n    web02\n";
        assert_eq!(parse_list_hosts(out), vec!["web01", "web02"]);
    }

    #[test]
    fn test_parse_list_hosts_empty() {
        let out = "  hosts (0):\n";
        assert!(parse_list_hosts(out).is_empty());
    }

    #[test]
    fn test_resolve_key_files_skips_absolute_and_missing() {
        let listing = json!({
            "_meta": {
                "hostvars": {
                    "h1": {"ansible_ssh_private_key_file": "/abs/key.pem"},
                    "h2": {"ansible_private_key_file": "no/such/key-file.pem"},
                    "h3": {"ansible_host": "10.0.0.3"}
                }
            }
        });
        assert!(resolve_key_files(&listing).is_empty());
    }
}
