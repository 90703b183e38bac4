//! Directory-backed async store for larger values.
//!
//! Each key is one pretty-printed JSON file whose name is the key with
//! every byte outside `[A-Za-z0-9._-]` percent-encoded:
//!
//! ```text
//! base_dir/
//! ├── tasks.json
//! ├── form%3Asignup.json
//! └── recovery-point-s1-2025-04-26T17%3A02%3A52.000Z-ab12.json
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::state::StateStore;

const EXTENSION: &str = ".json";

pub struct DirStore {
    base_dir: PathBuf,
}

impl DirStore {
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| WaypointError::storage("create_dir", e.to_string()))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}{EXTENSION}", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            // A leading dot would collide with temp files.
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[async_trait]
impl StateStore for DirStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        match fs::read(self.file_path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WaypointError::storage("get", format!("{key}: {e}"))),
        }
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        let path = self.file_path(key);
        let base_dir = self.base_dir.clone();
        let bytes = serde_json::to_vec_pretty(&value)?;

        // Each write gets its own temp file, so concurrent writers to one key
        // only race on the final rename.
        let write = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&base_dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        });
        write
            .await
            .map_err(|e| WaypointError::internal(format!("DirStore write task failed: {e}")))?
            .map_err(|e| WaypointError::storage("set", format!("{key}: {e}")))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WaypointError::storage("remove", format!("{key}: {e}"))),
        }
    }

    async fn clear(&self) -> Result<()> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| WaypointError::storage("keys", e.to_string()))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WaypointError::storage("keys", e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            let Some(stem) = name.strip_suffix(EXTENSION) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => tracing::warn!(file = %name, "[DirStore] Ignoring undecodable file name"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use waypoint_core::state::StateStoreExt;

    #[test]
    fn test_key_encoding_is_reversible() {
        for key in [
            "tasks",
            "form:signup",
            "recovery-point-s1-2025-04-26T17:02:52.000Z-ab12",
            ".hidden",
            "a/b\\c",
            "naïve",
        ] {
            let encoded = encode_key(key);
            assert!(!encoded.starts_with('.'));
            assert!(!encoded.contains('/'));
            assert_eq!(decode_key(&encoded).as_deref(), Some(key));
        }
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path()).await.unwrap();

        store.set("form:signup", &json!({"email": "a@b"})).await.unwrap();
        assert_eq!(
            store.get_raw("form:signup").await.unwrap(),
            Some(json!({"email": "a@b"}))
        );
        assert_eq!(store.keys().await.unwrap(), vec!["form:signup".to_string()]);

        store.remove("form:signup").await.unwrap();
        store.remove("form:signup").await.unwrap();
        assert_eq!(store.get_raw("form:signup").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_leaves_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path()).await.unwrap();
        store.set("a", &1).await.unwrap();
        store.set("view:b", &2).await.unwrap();
        std::fs::write(dir.path().join("README"), "keep").unwrap();

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        assert!(dir.path().join("README").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_key_keep_a_whole_value() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(DirStore::new(dir.path()).await.unwrap());
        let short = json!({"title": "a"});
        let long = json!({"title": "a much longer draft title", "body": "x".repeat(512)});

        for _ in 0..200 {
            let first = {
                let store = store.clone();
                let value = short.clone();
                tokio::spawn(async move { store.set_raw("form:f", value).await })
            };
            let second = {
                let store = store.clone();
                let value = long.clone();
                tokio::spawn(async move { store.set_raw("form:f", value).await })
            };
            first.await.unwrap().unwrap();
            second.await.unwrap().unwrap();

            let stored = store.get_raw("form:f").await.unwrap().unwrap();
            assert!(stored == short || stored == long);
        }
        assert_eq!(store.keys().await.unwrap(), vec!["form:f".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("tasks.json"), "{not json").unwrap();

        assert!(store.get_raw("tasks").await.is_err());
        assert_eq!(store.get("tasks", 3).await, 3);
    }
}
