//! Capturing and rehydrating the persisted subtrees of a window.

use serde_json::Value;
use std::collections::BTreeSet;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::keys::{self, CURRENT_WORKSPACE_KEY, FORM_PREFIX, TASKS_KEY, VIEW_PREFIX};
use waypoint_core::state::{AppSnapshot, StoreWrite, SyncStateStore, SyncStateStoreExt};

/// Reads every persisted subtree into a snapshot.
///
/// Never fails. A subtree that cannot be read is logged as partial data and
/// left out of the snapshot.
pub fn collect_app_state(store: &dyn SyncStateStore) -> AppSnapshot {
    let mut snapshot = AppSnapshot::default();

    match store.try_get_sync::<Vec<Value>>(TASKS_KEY) {
        Ok(tasks) => snapshot.tasks = tasks,
        Err(e) => report_partial(TASKS_KEY, e),
    }

    match store.get_raw_sync(CURRENT_WORKSPACE_KEY) {
        Ok(workspace) => snapshot.current_workspace = workspace,
        Err(e) => report_partial(CURRENT_WORKSPACE_KEY, e),
    }

    let keys = match store.keys_sync() {
        Ok(keys) => keys,
        Err(e) => {
            report_partial("form:*", e.clone());
            report_partial("view:*", e);
            return snapshot;
        }
    };

    for key in &keys {
        let (target, id) = if let Some(id) = key.strip_prefix(FORM_PREFIX) {
            (&mut snapshot.form_state, id)
        } else if let Some(id) = key.strip_prefix(VIEW_PREFIX) {
            (&mut snapshot.view_state, id)
        } else {
            continue;
        };
        match store.get_raw_sync(key) {
            Ok(Some(value)) => {
                target.insert(id.to_string(), value);
            }
            Ok(None) => {}
            Err(e) => report_partial(key, e),
        }
    }

    snapshot
}

fn report_partial(subtree: &str, cause: WaypointError) {
    let error = WaypointError::partial_data(subtree, cause.to_string());
    tracing::warn!(subtree = %subtree, error = %error, "[Snapshot] Subtree omitted");
}

/// Every write needed to make the store match a snapshot, computed before
/// anything is written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RestorePlan {
    writes: Vec<StoreWrite>,
}

impl RestorePlan {
    /// Plans a restore of `snapshot` over a store currently holding
    /// `existing_keys`. Subtrees absent from the snapshot are removed.
    pub fn build(snapshot: &AppSnapshot, existing_keys: &[String]) -> Self {
        let mut writes = Vec::new();

        match &snapshot.tasks {
            Some(tasks) => writes.push(StoreWrite::Set {
                key: TASKS_KEY.to_string(),
                value: Value::Array(tasks.clone()),
            }),
            None => writes.push(StoreWrite::Remove {
                key: TASKS_KEY.to_string(),
            }),
        }

        match &snapshot.current_workspace {
            Some(workspace) => writes.push(StoreWrite::Set {
                key: CURRENT_WORKSPACE_KEY.to_string(),
                value: workspace.clone(),
            }),
            None => writes.push(StoreWrite::Remove {
                key: CURRENT_WORKSPACE_KEY.to_string(),
            }),
        }

        let wanted: BTreeSet<String> = snapshot
            .form_state
            .keys()
            .map(|id| keys::form_key(id))
            .chain(snapshot.view_state.keys().map(|id| keys::view_key(id)))
            .collect();

        for key in existing_keys {
            let is_subtree = key.starts_with(FORM_PREFIX) || key.starts_with(VIEW_PREFIX);
            if is_subtree && !wanted.contains(key) {
                writes.push(StoreWrite::Remove { key: key.clone() });
            }
        }

        for (id, value) in &snapshot.form_state {
            writes.push(StoreWrite::Set {
                key: keys::form_key(id),
                value: value.clone(),
            });
        }
        for (id, value) in &snapshot.view_state {
            writes.push(StoreWrite::Set {
                key: keys::view_key(id),
                value: value.clone(),
            });
        }

        Self { writes }
    }

    pub fn writes(&self) -> &[StoreWrite] {
        &self.writes
    }

    /// Applies the whole plan as one batch; on failure the store is unchanged.
    pub fn apply(&self, store: &dyn SyncStateStore) -> Result<()> {
        store.write_batch_sync(&self.writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waypoint_infrastructure::MemoryStore;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.set_sync(TASKS_KEY, &json!([{"id": "t1"}])).unwrap();
        store
            .set_sync(CURRENT_WORKSPACE_KEY, &json!({"id": "W1"}))
            .unwrap();
        store.set_sync("form:signup", &json!({"email": "a@b"})).unwrap();
        store.set_sync("view:board", &json!({"zoom": 2})).unwrap();
        store.set_sync("unrelated", &json!(1)).unwrap();
        store
    }

    #[test]
    fn test_collect_reads_all_subtrees() {
        let snapshot = collect_app_state(&seeded());
        assert_eq!(snapshot.tasks, Some(vec![json!({"id": "t1"})]));
        assert_eq!(snapshot.current_workspace, Some(json!({"id": "W1"})));
        assert_eq!(snapshot.form_state["signup"], json!({"email": "a@b"}));
        assert_eq!(snapshot.view_state["board"], json!({"zoom": 2}));
    }

    #[test]
    fn test_collect_omits_failing_subtree() {
        let store = seeded();
        store.fail_key("form:signup");
        let snapshot = collect_app_state(&store);
        assert!(snapshot.form_state.is_empty());
        assert_eq!(snapshot.view_state.len(), 1);
        assert!(snapshot.tasks.is_some());
    }

    #[test]
    fn test_collect_omits_malformed_tasks() {
        let store = seeded();
        store.set_sync(TASKS_KEY, &json!({"not": "a list"})).unwrap();
        let snapshot = collect_app_state(&store);
        assert_eq!(snapshot.tasks, None);
        assert!(snapshot.current_workspace.is_some());
    }

    #[test]
    fn test_restore_makes_store_equal_snapshot() {
        let store = seeded();
        let target = AppSnapshot {
            tasks: Some(vec![json!({"id": "t9"})]),
            current_workspace: None,
            form_state: [("other".to_string(), json!({"x": 1}))].into_iter().collect(),
            view_state: Default::default(),
        };

        let plan = RestorePlan::build(&target, &store.keys_sync().unwrap());
        plan.apply(&store).unwrap();

        assert_eq!(collect_app_state(&store), target);
        assert_eq!(store.get_raw_sync("unrelated").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_failed_restore_leaves_store_untouched() {
        let store = seeded();
        let before = collect_app_state(&store);
        let target = AppSnapshot {
            tasks: Some(vec![json!({"id": "t9"})]),
            current_workspace: Some(json!({"id": "W2"})),
            form_state: [("signup".to_string(), json!({"email": "new"}))].into_iter().collect(),
            view_state: Default::default(),
        };

        let plan = RestorePlan::build(&target, &store.keys_sync().unwrap());
        store.fail_key("form:signup");
        assert!(plan.apply(&store).is_err());

        store.heal();
        assert_eq!(collect_app_state(&store), before);
    }
}
