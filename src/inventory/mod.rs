pub mod ansible;
pub mod pattern;
pub mod static_inventory;

pub use ansible::*;
pub use pattern::{parse_pattern, scoped_pattern, split_pattern, PatternOp, PatternTerm};
pub use static_inventory::*;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::InventoryError;

/// Where the engine should read the inventory from.
#[derive(Debug, Clone, PartialEq)]
pub enum InventorySource {
    Path(PathBuf),
    /// A YAML-plugin inventory document to be written out per call.
    Document(Value),
}

/// Resolves host patterns. Implementations must answer from the current
/// inventory state on every call.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn hosts(&self, pattern: &str) -> Result<Vec<String>, InventoryError>;

    async fn groups(&self) -> Result<Vec<String>, InventoryError>;

    fn source(&self) -> InventorySource;

    /// Per-host variables the engine must apply on top of the inventory.
    fn host_overrides(&self) -> HashMap<String, Map<String, Value>> {
        HashMap::new()
    }
}

/// Find `name` relative to the current directory, then each ancestor.
pub fn search_path(name: impl AsRef<Path>) -> Option<PathBuf> {
    let name = name.as_ref();
    if name.is_absolute() {
        return name.exists().then(|| name.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
}
