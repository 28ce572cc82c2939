use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Per-host key/value maps. Clones share the same underlying storage, which
/// is how filtered sessions see each other's facts and variables.
#[derive(Debug, Clone, Default)]
pub struct HostStore {
    inner: Arc<RwLock<HashMap<String, Map<String, Value>>>>,
}

impl HostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str, key: &str) -> Option<Value> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(host).and_then(|values| values.get(key)).cloned()
    }

    /// All values for `host`; empty when the host has none.
    pub fn host(&self, host: &str) -> Map<String, Value> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(host).cloned().unwrap_or_default()
    }

    pub fn set(&self, host: &str, key: impl Into<String>, value: Value) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(host.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn merge(&self, host: &str, values: Map<String, Value>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entry(host.to_string()).or_default().extend(values);
    }

    pub fn snapshot(&self) -> HashMap<String, Map<String, Value>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn shares_storage_with(&self, other: &HostStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
