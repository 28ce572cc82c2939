//! Variable documents for `initvars` and the order their patterns apply in.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{AdhocError, Result};

/// Pattern -> (name -> value).
pub type PatternVars = BTreeMap<String, Map<String, Value>>;

/// Input accepted by `initvars`.
///
/// ```yaml
/// all:
///   name1: "default value1"
/// webservers:
///   name1: "overridden for webservers"
/// host003:
///   name1: "overridden by host003 only"
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum VarsSource {
    Map(PatternVars),
    /// YAML or JSON file.
    File(PathBuf),
}

impl From<PatternVars> for VarsSource {
    fn from(vars: PatternVars) -> Self {
        VarsSource::Map(vars)
    }
}

impl From<PathBuf> for VarsSource {
    fn from(path: PathBuf) -> Self {
        VarsSource::File(path)
    }
}

impl From<&Path> for VarsSource {
    fn from(path: &Path) -> Self {
        VarsSource::File(path.to_path_buf())
    }
}

impl From<&str> for VarsSource {
    fn from(path: &str) -> Self {
        VarsSource::File(PathBuf::from(path))
    }
}

impl VarsSource {
    /// Accepts a JSON object whose values are objects (or null).
    pub fn from_value(value: Value) -> Result<Self> {
        pattern_vars(value).map(VarsSource::Map)
    }

    pub fn load(self) -> Result<PatternVars> {
        match self {
            VarsSource::Map(vars) => Ok(vars),
            VarsSource::File(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    AdhocError::config(format!("cannot read vars file {}: {e}", path.display()))
                })?;
                let value: Value = serde_yaml::from_str(&content).map_err(|e| {
                    AdhocError::config(format!("cannot parse vars file {}: {e}", path.display()))
                })?;
                pattern_vars(value)
            }
        }
    }
}

fn pattern_vars(value: Value) -> Result<PatternVars> {
    let Value::Object(patterns) = value else {
        return Err(AdhocError::config(
            "expecting a mapping of pattern to variables, or a path to a JSON/YAML file",
        ));
    };

    patterns
        .into_iter()
        .map(|(pattern, vars)| match vars {
            Value::Object(vars) => Ok((pattern, vars)),
            Value::Null => Ok((pattern, Map::new())),
            other => Err(AdhocError::config(format!(
                "variables for pattern '{pattern}' must be a mapping, got {other}"
            ))),
        })
        .collect()
}

/// `all` first, then group patterns, then host names.
pub fn layer_order<'a>(
    patterns: impl IntoIterator<Item = &'a String>,
    hosts: &BTreeSet<String>,
) -> Vec<String> {
    let mut has_all = false;
    let mut groups = BTreeSet::new();
    let mut host_patterns = BTreeSet::new();

    for pattern in patterns {
        if pattern == "all" {
            has_all = true;
        } else if hosts.contains(pattern) {
            host_patterns.insert(pattern.clone());
        } else {
            groups.insert(pattern.clone());
        }
    }

    has_all
        .then(|| "all".to_string())
        .into_iter()
        .chain(groups)
        .chain(host_patterns)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_layer_order() {
        let patterns: Vec<String> = ["h1", "web", "all", "db"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let hosts: BTreeSet<String> = ["h1", "h2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(layer_order(&patterns, &hosts), vec!["all", "db", "web", "h1"]);
    }

    #[test]
    fn test_layer_order_without_all() {
        let patterns = vec!["web".to_string()];
        assert_eq!(layer_order(&patterns, &BTreeSet::new()), vec!["web"]);
    }

    #[test]
    fn test_from_value_rejects_non_map() {
        assert!(matches!(
            VarsSource::from_value(json!(["all"])),
            Err(AdhocError::Config { .. })
        ));
        assert!(matches!(
            VarsSource::from_value(json!({"all": 3})),
            Err(AdhocError::Config { .. })
        ));
    }

    #[test]
    fn test_null_pattern_is_empty() {
        let vars = VarsSource::from_value(json!({"web": null})).unwrap().load().unwrap();
        assert!(vars["web"].is_empty());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "all:\n  x: 1\nweb:\n  x: 2\n  name: nginx").unwrap();

        let vars = VarsSource::from(file.path()).load().unwrap();
        assert_eq!(vars["all"]["x"], json!(1));
        assert_eq!(vars["web"]["name"], json!("nginx"));
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"all": {{"x": 1}}, "h1": {{"x": 3}}}}"#).unwrap();

        let vars = VarsSource::from(file.path()).load().unwrap();
        assert_eq!(vars["h1"]["x"], json!(3));
    }

    #[test]
    fn test_missing_or_bad_file() {
        assert!(matches!(
            VarsSource::from("/no/such/vars.yml").load(),
            Err(AdhocError::Config { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- just\n- a list").unwrap();
        assert!(matches!(
            VarsSource::from(file.path()).load(),
            Err(AdhocError::Config { .. })
        ));
    }
}
