//! In-memory store for tests and ephemeral windows.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::state::{StateStore, StoreWrite, SyncStateStore};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
    /// Keys whose reads and writes fail, for exercising degraded paths.
    failing: RwLock<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every access to `key` fail with a storage error.
    pub fn fail_key(&self, key: impl Into<String>) {
        if let Ok(mut failing) = self.failing.write() {
            failing.push(key.into());
        }
    }

    pub fn heal(&self) {
        if let Ok(mut failing) = self.failing.write() {
            failing.clear();
        }
    }

    fn check(&self, operation: &str, key: &str) -> Result<()> {
        let failing = self
            .failing
            .read()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        if failing.iter().any(|k| k == key) {
            return Err(WaypointError::storage(operation, format!("injected failure for '{key}'")));
        }
        Ok(())
    }
}

impl SyncStateStore for MemoryStore {
    fn get_raw_sync(&self, key: &str) -> Result<Option<Value>> {
        self.check("get", key)?;
        let entries = self
            .entries
            .read()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set_raw_sync(&self, key: &str, value: Value) -> Result<()> {
        self.check("set", key)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_sync(&self, key: &str) -> Result<()> {
        self.check("remove", key)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn clear_sync(&self) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        entries.clear();
        Ok(())
    }

    fn keys_sync(&self) -> Result<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        Ok(entries.keys().cloned().collect())
    }

    fn write_batch_sync(&self, writes: &[StoreWrite]) -> Result<()> {
        for write in writes {
            self.check("batch", write.key())?;
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| WaypointError::internal("memory store poisoned"))?;
        for write in writes {
            match write {
                StoreWrite::Set { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                StoreWrite::Remove { key } => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        self.get_raw_sync(key)
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        self.set_raw_sync(key, value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.remove_sync(key)
    }

    async fn clear(&self) -> Result<()> {
        self.clear_sync()
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.keys_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::state::SyncStateStoreExt;

    #[test]
    fn test_injected_failure() {
        let store = MemoryStore::new();
        store.set_sync("tasks", &vec![1, 2]).unwrap();
        store.fail_key("tasks");
        assert!(store.get_raw_sync("tasks").is_err());
        assert_eq!(store.get_sync("tasks", Vec::<i32>::new()), Vec::<i32>::new());

        store.heal();
        assert_eq!(store.get_sync("tasks", Vec::<i32>::new()), vec![1, 2]);
    }

    #[test]
    fn test_batch_with_failing_key_writes_nothing() {
        let store = MemoryStore::new();
        store.set_sync("tasks", &vec![1]).unwrap();
        store.fail_key("form:a");

        let batch = vec![
            StoreWrite::Set {
                key: "tasks".to_string(),
                value: serde_json::json!([2]),
            },
            StoreWrite::Remove {
                key: "form:a".to_string(),
            },
        ];
        assert!(store.write_batch_sync(&batch).is_err());
        assert_eq!(store.get_sync("tasks", Vec::<i32>::new()), vec![1]);

        store.heal();
        store.write_batch_sync(&batch).unwrap();
        assert_eq!(store.get_sync("tasks", Vec::<i32>::new()), vec![2]);
    }
}
