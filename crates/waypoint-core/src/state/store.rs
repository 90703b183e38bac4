//! Key/value store contract shared by every backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Asynchronous key/value store holding JSON values.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the raw value under `key`, or `None` when absent.
    async fn get_raw(&self, key: &str) -> Result<Option<Value>>;

    async fn set_raw(&self, key: &str, value: Value) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// All keys currently present, in lexicographic order.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// A store that can also be used without an async runtime.
///
/// The window event loop writes every checkpoint through this path so an
/// unload never depends on a pending future.
pub trait SyncStateStore: StateStore {
    fn get_raw_sync(&self, key: &str) -> Result<Option<Value>>;

    fn set_raw_sync(&self, key: &str, value: Value) -> Result<()>;

    fn remove_sync(&self, key: &str) -> Result<()>;

    fn clear_sync(&self) -> Result<()>;

    fn keys_sync(&self) -> Result<Vec<String>>;

    /// Applies every write or none of them.
    fn write_batch_sync(&self, writes: &[StoreWrite]) -> Result<()>;
}

/// One mutation inside [`SyncStateStore::write_batch_sync`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreWrite {
    Set { key: String, value: Value },
    Remove { key: String },
}

impl StoreWrite {
    pub fn key(&self) -> &str {
        match self {
            StoreWrite::Set { key, .. } | StoreWrite::Remove { key } => key,
        }
    }
}

/// Typed helpers over [`StateStore`].
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Reads and decodes `key`. A value that does not decode is an error.
    async fn try_get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Reads `key`, falling back to `default` when it is absent or unreadable.
    async fn get<T>(&self, key: &str, default: T) -> T
    where
        T: DeserializeOwned + Send,
    {
        match self.try_get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "[StateStore] Falling back to default");
                default
            }
        }
    }

    async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_raw(key, value).await
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// Typed helpers over [`SyncStateStore`].
pub trait SyncStateStoreExt: SyncStateStore {
    fn try_get_sync<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw_sync(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn get_sync<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.try_get_sync(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "[StateStore] Falling back to default");
                default
            }
        }
    }

    fn set_sync<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_raw_sync(key, value)
    }
}

impl<S: SyncStateStore + ?Sized> SyncStateStoreExt for S {}
