//! Append-only local store.
//!
//! Every mutation is one JSON line appended to `store.log` and flushed to
//! disk before the call returns, so a write that returned survives a crash
//! of the window that made it. The in-memory index is rebuilt from the log
//! on open. Once dead records outnumber live keys the log is compacted into
//! a fresh file and swapped in by rename.
//!
//! ```text
//! {"op":"set","key":"tasks","value":[...]}
//! {"op":"remove","key":"form:signup"}
//! {"op":"clear"}
//! {"op":"batch","writes":[{"op":"set","key":"tasks","value":[]},{"op":"remove","key":"view:board"}]}
//! ```
//!
//! A batch is a single line, so replay sees all of it or none of it.

use super::file_lock::{FileLock, temp_path};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::state::{StateStore, StoreWrite, SyncStateStore};

const LOG_FILE: &str = "store.log";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Set { key: String, value: Value },
    Remove { key: String },
    Clear,
    Batch { writes: Vec<StoreWrite> },
}

impl LogRecord {
    fn apply_to(self, index: &mut BTreeMap<String, Value>) {
        match self {
            LogRecord::Set { key, value } => {
                index.insert(key, value);
            }
            LogRecord::Remove { key } => {
                index.remove(&key);
            }
            LogRecord::Clear => index.clear(),
            LogRecord::Batch { writes } => {
                for write in writes {
                    match write {
                        StoreWrite::Set { key, value } => {
                            index.insert(key, value);
                        }
                        StoreWrite::Remove { key } => {
                            index.remove(&key);
                        }
                    }
                }
            }
        }
    }
}

/// The file operations an append needs.
trait LogSink: IoWrite {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Appends one line and syncs it. On failure the sink is cut back to its
/// previous length so no partial record is left for the next append to
/// land on.
fn append_line<S: LogSink>(sink: &mut S, line: &[u8]) -> io::Result<()> {
    let len = sink.size()?;
    if let Err(e) = sink.write_all(line).and_then(|_| sink.sync()) {
        if let Err(truncate_error) = sink.truncate(len) {
            tracing::error!(
                error = %truncate_error,
                "[LocalStore] Could not drop a partial record"
            );
            // Keeps the next record off the torn line.
            let _ = sink.write_all(b"\n");
        }
        return Err(e);
    }
    Ok(())
}

struct LogState {
    file: File,
    index: BTreeMap<String, Value>,
    /// Records currently in the log file.
    records: usize,
}

/// Durable, synchronous-capable key/value store backed by a JSON-lines log.
///
/// One process owns a store directory at a time; [`LocalStore::open`] fails
/// with a storage error if another handle holds its lock.
pub struct LocalStore {
    path: PathBuf,
    compact_threshold: usize,
    state: Mutex<LogState>,
    _lock: FileLock,
}

impl LocalStore {
    /// Opens (or creates) the store in `dir`, replaying its log.
    pub fn open(dir: impl AsRef<Path>, compact_threshold: usize) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);
        let lock = FileLock::try_acquire(&path)?;

        let replayed = replay(&path)?;
        let file = open_append(&path)?;

        tracing::debug!(
            path = %path.display(),
            keys = replayed.index.len(),
            records = replayed.records,
            "[LocalStore] Opened"
        );

        let store = Self {
            path,
            compact_threshold,
            state: Mutex::new(LogState {
                file,
                index: replayed.index,
                records: replayed.records,
            }),
            _lock: lock,
        };
        if replayed.skipped > 0 {
            // New records must not land on the same line as a torn one.
            store.compact_now()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, LogState>> {
        self.state
            .lock()
            .map_err(|_| WaypointError::internal("local store state poisoned"))
    }

    fn append(&self, state: &mut LogState, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        append_line(&mut state.file, &line)
            .map_err(|e| WaypointError::storage("append", e.to_string()))?;
        state.records += 1;
        Ok(())
    }

    /// Compacts once dead records dominate. Call after the index reflects
    /// the last appended record.
    fn maybe_compact(&self, state: &mut LogState) -> Result<()> {
        if state.records > self.compact_threshold && state.records > state.index.len() * 2 {
            self.compact(state)?;
        }
        Ok(())
    }

    /// Rewrites the log so it holds exactly one `set` per live key.
    fn compact(&self, state: &mut LogState) -> Result<()> {
        let tmp_path = temp_path(&self.path)?;
        match fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(WaypointError::storage("compact", e.to_string())),
        }

        // The handle opened here follows the file through the rename, so the
        // store never switches to a log it could not open.
        let mut compacted = open_append(&tmp_path)?;
        let written = (|| -> Result<()> {
            for (key, value) in &state.index {
                let record = LogRecord::Set {
                    key: key.clone(),
                    value: value.clone(),
                };
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                compacted.write_all(&line)?;
            }
            compacted.sync_all()?;
            fs::rename(&tmp_path, &self.path)
                .map_err(|e| WaypointError::storage("compact", e.to_string()))
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        state.file = compacted;

        tracing::debug!(
            before = state.records,
            after = state.index.len(),
            "[LocalStore] Compacted log"
        );
        state.records = state.index.len();
        Ok(())
    }

    /// Forces a compaction regardless of the threshold.
    pub fn compact_now(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        self.compact(&mut state)
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| WaypointError::storage("open", format!("{}: {}", path.display(), e)))
}

struct Replayed {
    index: BTreeMap<String, Value>,
    records: usize,
    skipped: usize,
}

/// Rebuilds the index from the log. Unparseable lines (a torn tail after a
/// crash) are skipped and counted.
fn replay(path: &Path) -> Result<Replayed> {
    let mut index = BTreeMap::new();
    let mut records = 0;
    let mut skipped = 0;

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Replayed {
                index,
                records,
                skipped,
            });
        }
        Err(e) => return Err(WaypointError::storage("replay", e.to_string())),
    };

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| WaypointError::storage("replay", e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(&line) {
            Ok(record) => record.apply_to(&mut index),
            Err(e) => {
                tracing::warn!(
                    line = line_no + 1,
                    error = %e,
                    "[LocalStore] Skipping unreadable log record"
                );
                skipped += 1;
                continue;
            }
        }
        records += 1;
    }

    Ok(Replayed {
        index,
        records,
        skipped,
    })
}

impl SyncStateStore for LocalStore {
    fn get_raw_sync(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock_state()?.index.get(key).cloned())
    }

    fn set_raw_sync(&self, key: &str, value: Value) -> Result<()> {
        let mut state = self.lock_state()?;
        let record = LogRecord::Set {
            key: key.to_string(),
            value,
        };
        self.append(&mut state, &record)?;
        record.apply_to(&mut state.index);
        self.maybe_compact(&mut state)
    }

    fn remove_sync(&self, key: &str) -> Result<()> {
        let mut state = self.lock_state()?;
        if !state.index.contains_key(key) {
            return Ok(());
        }
        self.append(
            &mut state,
            &LogRecord::Remove {
                key: key.to_string(),
            },
        )?;
        state.index.remove(key);
        self.maybe_compact(&mut state)
    }

    fn clear_sync(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        self.append(&mut state, &LogRecord::Clear)?;
        state.index.clear();
        self.maybe_compact(&mut state)
    }

    fn keys_sync(&self) -> Result<Vec<String>> {
        Ok(self.lock_state()?.index.keys().cloned().collect())
    }

    fn write_batch_sync(&self, writes: &[StoreWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut state = self.lock_state()?;
        let record = LogRecord::Batch {
            writes: writes.to_vec(),
        };
        self.append(&mut state, &record)?;
        record.apply_to(&mut state.index);
        self.maybe_compact(&mut state)
    }
}

#[async_trait]
impl StateStore for LocalStore {
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
    use serde_json::json;
    use tempfile::TempDir;
    use waypoint_core::state::SyncStateStoreExt;

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), 100).unwrap();
            store.set_sync("tasks", &json!([{"id": "t1"}])).unwrap();
            store.set_sync("form:signup", &json!({"email": "a@b"})).unwrap();
            store.remove_sync("form:signup").unwrap();
        }

        let store = LocalStore::open(dir.path(), 100).unwrap();
        assert_eq!(store.get_raw_sync("tasks").unwrap(), Some(json!([{"id": "t1"}])));
        assert_eq!(store.get_raw_sync("form:signup").unwrap(), None);
        assert_eq!(store.keys_sync().unwrap(), vec!["tasks".to_string()]);
    }

    #[test]
    fn test_clear_is_durable() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), 100).unwrap();
            store.set_sync("a", &1).unwrap();
            store.clear_sync().unwrap();
            store.set_sync("b", &2).unwrap();
        }
        let store = LocalStore::open(dir.path(), 100).unwrap();
        assert_eq!(store.keys_sync().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_torn_tail_is_skipped() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), 100).unwrap();
            store.set_sync("kept", &"yes").unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(LOG_FILE))
            .unwrap();
        file.write_all(br#"{"op":"set","key":"torn","val"#).unwrap();
        drop(file);

        {
            let store = LocalStore::open(dir.path(), 100).unwrap();
            assert_eq!(store.get_sync("kept", String::new()), "yes");
            assert_eq!(store.get_raw_sync("torn").unwrap(), None);
            store.set_sync("after", &1).unwrap();
        }

        let store = LocalStore::open(dir.path(), 100).unwrap();
        assert_eq!(store.get_sync("after", 0), 1);
    }

    #[test]
    fn test_compaction_keeps_live_values() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), 4).unwrap();
        for n in 0..10 {
            store.set_sync("counter", &n).unwrap();
        }
        store.set_sync("other", &"x").unwrap();

        assert!(line_count(store.path()) <= 4);
        assert_eq!(store.get_sync("counter", -1), 9);

        drop(store);
        let store = LocalStore::open(dir.path(), 4).unwrap();
        assert_eq!(store.get_sync("counter", -1), 9);
        assert_eq!(store.get_sync("other", String::new()), "x");
    }

    #[test]
    fn test_compact_now() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), 1_000).unwrap();
        store.set_sync("k", &1).unwrap();
        store.set_sync("k", &2).unwrap();
        store.remove_sync("gone").unwrap();
        store.compact_now().unwrap();
        assert_eq!(line_count(store.path()), 1);
    }

    #[test]
    fn test_batch_is_one_record_and_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), 100).unwrap();
            store.set_sync("view:board", &json!({"zoom": 2})).unwrap();
            store
                .write_batch_sync(&[
                    StoreWrite::Set {
                        key: "tasks".to_string(),
                        value: json!([{"id": "t1"}]),
                    },
                    StoreWrite::Remove {
                        key: "view:board".to_string(),
                    },
                ])
                .unwrap();
            assert_eq!(line_count(store.path()), 2);
        }

        let store = LocalStore::open(dir.path(), 100).unwrap();
        assert_eq!(store.keys_sync().unwrap(), vec!["tasks".to_string()]);
        assert_eq!(store.get_raw_sync("tasks").unwrap(), Some(json!([{"id": "t1"}])));
    }

    /// Accepts `budget` bytes, then fails every write.
    struct FlakySink {
        data: Vec<u8>,
        budget: usize,
    }

    impl IoWrite for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for FlakySink {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_leaves_no_partial_record() {
        let mut sink = FlakySink {
            data: Vec::new(),
            budget: usize::MAX,
        };
        append_line(&mut sink, b"{\"op\":\"set\",\"key\":\"a\",\"value\":1}\n").unwrap();

        sink.budget = 10;
        let torn = append_line(&mut sink, b"{\"op\":\"set\",\"key\":\"b\",\"value\":2}\n");
        assert!(torn.is_err());

        sink.budget = usize::MAX;
        append_line(&mut sink, b"{\"op\":\"set\",\"key\":\"c\",\"value\":3}\n").unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE);
        fs::write(&path, &sink.data).unwrap();
        let replayed = replay(&path).unwrap();
        assert_eq!(replayed.skipped, 0);
        assert_eq!(replayed.index.get("a"), Some(&json!(1)));
        assert_eq!(replayed.index.get("b"), None);
        assert_eq!(replayed.index.get("c"), Some(&json!(3)));
    }

    #[test]
    fn test_writes_after_compaction_reach_the_new_log() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), 1_000).unwrap();
            store.set_sync("k", &1).unwrap();
            store.set_sync("k", &2).unwrap();
            store.compact_now().unwrap();
            store.set_sync("after", &"yes").unwrap();
            assert_eq!(line_count(store.path()), 2);
        }
        assert!(!dir.path().join(format!(".{LOG_FILE}.tmp")).exists());

        let store = LocalStore::open(dir.path(), 1_000).unwrap();
        assert_eq!(store.get_sync("k", 0), 2);
        assert_eq!(store.get_sync("after", String::new()), "yes");
    }

    #[cfg(unix)]
    #[test]
    fn test_second_open_is_rejected() {
        let dir = TempDir::new().unwrap();
        let _store = LocalStore::open(dir.path(), 100).unwrap();
        let second = LocalStore::open(dir.path(), 100);
        assert!(matches!(second, Err(WaypointError::Storage { .. })));
    }

    #[test]
    fn test_domain_shapes_round_trip() {
        use chrono::{TimeZone, Utc};
        use std::collections::BTreeMap;
        use waypoint_core::checkpoint::{RecoveryPoint, SnapshotType};
        use waypoint_core::session::{DeviceInfo, Session, SessionRefs};
        use waypoint_core::state::AppSnapshot;

        let at = Utc.with_ymd_and_hms(2025, 4, 26, 17, 2, 52).unwrap();
        let mut session = Session::start(
            "s-1",
            "alice",
            SessionRefs {
                workspace: Some("w1".to_string()),
                ..Default::default()
            },
            DeviceInfo {
                window_id: Some("window_abc".to_string()),
                user_agent: None,
                platform: Some("linux".to_string()),
                ip_address: None,
                last_active_at: at,
            },
            at,
        );
        session.close_open_entries(at + chrono::Duration::minutes(7));
        let point = RecoveryPoint {
            id: "rp-1".to_string(),
            timestamp: at,
            description: "Before refactor".to_string(),
            state_key: "recovery-point-s-1-x".to_string(),
            snapshot_type: SnapshotType::Manual,
            operation_context: Some(json!({"formId": "task"})),
        };
        let snapshot = AppSnapshot {
            tasks: Some(vec![json!({"id": "t1", "done": false})]),
            current_workspace: Some(json!("w1")),
            form_state: BTreeMap::from([("task".to_string(), json!({"title": "x"}))]),
            view_state: BTreeMap::new(),
        };

        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), 100).unwrap();
            store.set_sync("session", &session).unwrap();
            store.set_sync("point", &point).unwrap();
            store.set_sync("snapshot", &snapshot).unwrap();
        }
        let store = LocalStore::open(dir.path(), 100).unwrap();
        assert_eq!(store.try_get_sync::<Session>("session").unwrap(), Some(session));
        assert_eq!(store.try_get_sync::<RecoveryPoint>("point").unwrap(), Some(point));
        assert_eq!(store.try_get_sync::<AppSnapshot>("snapshot").unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_async_contract() {
        use waypoint_core::state::StateStoreExt;

        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), 100).unwrap();
        store.set("view:board", &json!({"zoom": 2})).await.unwrap();
        let view: Option<Value> = store.try_get("view:board").await.unwrap();
        assert_eq!(view, Some(json!({"zoom": 2})));
        assert_eq!(store.get("missing", 7u32).await, 7);
    }
}
