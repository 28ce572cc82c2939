use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::SessionConfig;
use crate::engine::ModuleEngine;
use crate::error::EngineError;
use crate::inventory::InventorySource;
use crate::invocation::{Invocation, RunnerOptions};
use crate::response::{EngineOutput, HostResult};

/// Runs calls through the `ansible` ad-hoc command with the JSON stdout
/// callback.
#[derive(Debug, Clone)]
pub struct AnsibleEngine {
    ansible: PathBuf,
}

impl AnsibleEngine {
    pub fn new(config: &SessionConfig) -> Result<Self, EngineError> {
        let ansible =
            which::which(&config.ansible_command).map_err(|_| EngineError::ExecutableNotFound {
                name: config.ansible_command.clone(),
            })?;

        Ok(Self { ansible })
    }

    /// Targets the resolved host names, not the session pattern.
    fn build_command(
        &self,
        invocation: &Invocation,
        inventory: &Path,
        overlay: Option<&Path>,
    ) -> Command {
        let options = &invocation.options;
        let mut cmd = Command::new(&self.ansible);

        cmd.arg(invocation.hosts.join(",")).arg("-i").arg(inventory);
        if let Some(overlay) = overlay {
            cmd.arg("-i").arg(overlay);
        }

        cmd.arg("-m").arg(&options.module_name);
        if let Some(args) = module_arg_string(options) {
            cmd.arg("-a").arg(args);
        }

        cmd.arg("--forks").arg(options.forks.to_string());
        if let Some(key) = &options.private_key_file {
            cmd.arg("--private-key").arg(key);
        }
        if options.become_ {
            cmd.arg("--become");
        }
        if let Some(user) = &options.become_user {
            cmd.arg("--become-user").arg(user);
        }
        if let Some(user) = &options.remote_user {
            cmd.arg("--user").arg(user);
        }
        if options.check {
            cmd.arg("--check");
        }
        if options.diff {
            cmd.arg("--diff");
        }
        if let Some(timeout) = options.timeout {
            cmd.arg("--timeout").arg(timeout.to_string());
        }

        cmd.env("ANSIBLE_STDOUT_CALLBACK", "json")
            .env("ANSIBLE_LOAD_CALLBACK_PLUGINS", "1")
            .env("ANSIBLE_RETRY_FILES_ENABLED", "False")
            .env("ANSIBLE_NOCOLOR", "1");
        if options.no_log {
            cmd.env("ANSIBLE_NO_TARGET_SYSLOG", "True");
        }
        if let Some(checking) = options.host_key_checking {
            cmd.env(
                "ANSIBLE_HOST_KEY_CHECKING",
                if checking { "True" } else { "False" },
            );
        }
        cmd.envs(&invocation.environment).kill_on_drop(true);

        cmd
    }
}

#[async_trait]
impl ModuleEngine for AnsibleEngine {
    async fn run(&self, invocation: &Invocation) -> Result<EngineOutput, EngineError> {
        if invocation.hosts.is_empty() {
            tracing::debug!(
                "Pattern {} matched no hosts, skipping {}",
                invocation.options.pattern,
                invocation.options.module_name
            );
            return Ok(EngineOutput::default());
        }

        let workdir = tempfile::tempdir()?;

        let inventory = match &invocation.inventory {
            InventorySource::Path(path) => path.clone(),
            InventorySource::Document(doc) => {
                let path = workdir.path().join("inventory.json");
                tokio::fs::write(&path, serde_json::to_vec(doc)?).await?;
                path
            }
        };

        let overlay = overlay_document(invocation);
        let overlay_path = match overlay {
            Some(doc) => {
                let path = workdir.path().join("session_vars.json");
                tokio::fs::write(&path, serde_json::to_vec(&doc)?).await?;
                Some(path)
            }
            None => None,
        };

        let mut cmd = self.build_command(invocation, &inventory, overlay_path.as_deref());
        tracing::debug!("Running {:?}", cmd.as_std());

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse_json_callback(&stdout) {
            Ok(parsed) => {
                if !output.status.success() {
                    tracing::debug!(
                        "ansible exited with {} ({} contacted, {} dark)",
                        output.status,
                        parsed.contacted.len(),
                        parsed.dark.len()
                    );
                }
                Ok(parsed)
            }
            Err(e) if output.status.success() => Err(e),
            Err(_) => Err(EngineError::ProcessFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// `-a` value: the raw string for free-form calls with keyword arguments
/// appended as `key=value`, otherwise the keyword arguments as JSON.
pub fn module_arg_string(options: &RunnerOptions) -> Option<String> {
    match &options.module_args {
        Some(raw) => {
            let mut parts = vec![raw.clone()];
            for (key, value) in &options.complex_args {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                parts.push(format!("{key}={}", shell_words::quote(&value)));
            }
            Some(parts.join(" "))
        }
        None if options.complex_args.is_empty() => None,
        None => Some(Value::Object(options.complex_args.clone()).to_string()),
    }
}

/// Second inventory source carrying session facts and variables for the
/// targeted hosts.
fn overlay_document(invocation: &Invocation) -> Option<Value> {
    let hosts: Map<String, Value> = invocation
        .hosts
        .iter()
        .filter_map(|host| {
            let vars = invocation.host_vars(host);
            (!vars.is_empty()).then(|| (host.clone(), Value::Object(vars)))
        })
        .collect();

    if hosts.is_empty() {
        None
    } else {
        Some(json!({ "all": { "hosts": hosts } }))
    }
}

/// Split the json stdout callback document into contacted and dark hosts.
/// Unreachable hosts are always flagged `failed`.
pub fn parse_json_callback(stdout: &str) -> Result<EngineOutput, EngineError> {
    let trimmed = stdout.trim_start();
    let start = if trimmed.starts_with('{') {
        stdout.len() - trimmed.len()
    } else {
        stdout
            .find("\n{")
            .map(|i| i + 1)
            .ok_or_else(|| EngineError::InvalidOutput {
                reason: "no JSON document in engine output".to_string(),
            })?
    };

    let document: Value =
        serde_json::from_str(&stdout[start..]).map_err(|e| EngineError::InvalidOutput {
            reason: e.to_string(),
        })?;

    let plays = document
        .get("plays")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::InvalidOutput {
            reason: "missing plays".to_string(),
        })?;

    let mut output = EngineOutput::default();
    let tasks = plays
        .iter()
        .filter_map(|play| play.get("tasks").and_then(Value::as_array))
        .flatten();

    for task in tasks {
        let Some(hosts) = task.get("hosts").and_then(Value::as_object) else {
            continue;
        };

        for (host, result) in hosts {
            let mut result: HostResult = match result {
                Value::Object(map) => map.clone(),
                other => {
                    tracing::warn!("Non-object result for {}: {}", host, other);
                    continue;
                }
            };
            result.retain(|key, _| !key.starts_with("_ansible"));

            if result.get("unreachable").and_then(Value::as_bool) == Some(true) {
                result
                    .entry("failed".to_string())
                    .or_insert(Value::Bool(true));
                output.contacted.remove(host);
                output.dark.insert(host.clone(), result);
            } else {
                output.dark.remove(host);
                output.contacted.insert(host.clone(), result);
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    const CALLBACK_OUTPUT: &str = r#"{
    "custom_stats": {},
    "global_custom_stats": {},
    "plays": [
        {
            "play": {"name": "Ansible Ad-Hoc"},
            "tasks": [
                {
                    "hosts": {
                        "web01": {
                            "_ansible_no_log": false,
                            "action": "setup",
                            "changed": false,
                            "ansible_facts": {"ansible_distribution": "Debian"}
                        },
                        "web02": {
                            "changed": false,
                            "msg": "Failed to connect to the host via ssh",
                            "unreachable": true
                        },
                        "db01": {
                            "changed": false,
                            "failed": true,
                            "msg": "boom"
                        }
                    },
                    "task": {"name": "setup"}
                }
            ]
        }
    ],
    "stats": {}
}"#;

    #[test]
    fn test_parse_json_callback() {
        let output = parse_json_callback(CALLBACK_OUTPUT).unwrap();
        assert_eq!(output.contacted.len(), 2);
        assert_eq!(output.dark.len(), 1);

        let dark = &output.dark["web02"];
        assert_eq!(dark["failed"], json!(true));
        assert!(!output.contacted["web01"].contains_key("_ansible_no_log"));
        assert_eq!(output.contacted["db01"]["failed"], json!(true));
    }

    #[test]
    fn test_parse_skips_leading_noise() {
        let noisy = format!("[WARNING]: something odd\n{CALLBACK_OUTPUT}");
        let output = parse_json_callback(&noisy).unwrap();
        assert_eq!(output.contacted.len(), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_json_callback("ERROR! no inventory"),
            Err(EngineError::InvalidOutput { .. })
        ));
        assert!(matches!(
            parse_json_callback("{\"stats\": {}}"),
            Err(EngineError::InvalidOutput { .. })
        ));
    }

    fn options(module_args: Option<&str>, complex: Value) -> RunnerOptions {
        let mut options = RunnerOptions::new("shell", "all", &SessionConfig::default());
        options.module_args = module_args.map(String::from);
        options.complex_args = complex.as_object().cloned().unwrap();
        options
    }

    #[test]
    fn test_module_arg_string_free_form() {
        let args = module_arg_string(&options(Some("echo hi"), json!({"chdir": "/tmp/my dir"})));
        assert_eq!(args.as_deref(), Some("echo hi chdir='/tmp/my dir'"));
    }

    #[test]
    fn test_module_arg_string_json() {
        let args = module_arg_string(&options(None, json!({"name": "nginx", "state": "present"})));
        let parsed: Value = serde_json::from_str(&args.unwrap()).unwrap();
        assert_eq!(parsed, json!({"name": "nginx", "state": "present"}));
        assert!(module_arg_string(&options(None, json!({}))).is_none());
    }

    #[test]
    fn test_command_targets_resolved_hosts() {
        let engine = AnsibleEngine {
            ansible: PathBuf::from("ansible"),
        };
        let invocation = Invocation {
            options: RunnerOptions::new("ping", "all:&(web01,db01)", &SessionConfig::default()),
            hosts: vec!["db01".to_string(), "web01".to_string()],
            inventory: InventorySource::Path("inventory".into()),
            host_overrides: HashMap::new(),
            environment: BTreeMap::new(),
        };

        let cmd = engine.build_command(&invocation, Path::new("inventory"), None);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "db01,web01");
        assert_eq!(args[1..3], ["-i", "inventory"]);
    }

    #[test]
    fn test_overlay_only_targets_resolved_hosts() {
        let mut opts = RunnerOptions::new("ping", "web", &SessionConfig::default());
        opts.vars.insert(
            "web01".to_string(),
            json!({"port": 80}).as_object().cloned().unwrap(),
        );
        opts.vars.insert(
            "db01".to_string(),
            json!({"port": 5432}).as_object().cloned().unwrap(),
        );

        let invocation = Invocation {
            options: opts,
            hosts: vec!["web01".to_string(), "web02".to_string()],
            inventory: InventorySource::Path("inventory".into()),
            host_overrides: HashMap::new(),
            environment: BTreeMap::new(),
        };

        let overlay = overlay_document(&invocation).unwrap();
        let hosts = overlay["all"]["hosts"].as_object().unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts["web01"]["port"], json!(80));
    }
}
