//! Debounced form persistence.
//!
//! A [`SessionForm`] keeps a field map in memory and mirrors it to
//! `form:{form_id}` in the store after a quiet period, so a crash loses at
//! most the last few keystrokes. A newer change supersedes a pending write;
//! a write that already started always runs to completion.

use crate::window::SessionHandle;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use waypoint_core::config::FormConfig;
use waypoint_core::keys;
use waypoint_core::state::{StateStore, StateStoreExt};

pub type FormValues = Map<String, Value>;

/// Runs the latest scheduled job once its delay passes without a newer one.
struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
    /// Held by a job while it runs.
    running: Arc<Mutex<()>>,
}

impl Debouncer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            running: Arc::new(Mutex::new(())),
        }
    }

    fn schedule<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduled = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let running = self.running.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _running = running.lock().await;
            if generation.load(Ordering::SeqCst) == scheduled {
                job.await;
            }
        });
    }

    /// Supersedes anything pending and waits for a job that already started.
    async fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.running.lock().await;
    }
}

/// Persisted state of one form.
pub struct SessionForm {
    form_id: String,
    key: String,
    initial: FormValues,
    values: FormValues,
    errors: BTreeMap<String, String>,
    touched: BTreeSet<String>,
    is_pristine: bool,
    is_submitting: bool,
    auto_save: bool,
    store: Arc<dyn StateStore>,
    window: Option<SessionHandle>,
    saves: Debouncer,
}

impl SessionForm {
    pub fn new(
        form_id: impl Into<String>,
        initial: FormValues,
        store: Arc<dyn StateStore>,
        config: &FormConfig,
    ) -> Self {
        let form_id = form_id.into();
        Self {
            key: keys::form_key(&form_id),
            form_id,
            values: initial.clone(),
            initial,
            errors: BTreeMap::new(),
            touched: BTreeSet::new(),
            is_pristine: true,
            is_submitting: false,
            auto_save: config.auto_save,
            store,
            window: None,
            saves: Debouncer::new(config.save_debounce()),
        }
    }

    /// Also asks `window` for a debounced "Form state" recovery point on
    /// every change.
    pub fn with_checkpoints(mut self, window: SessionHandle) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.touched.contains(field)
    }

    pub fn is_pristine(&self) -> bool {
        self.is_pristine
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    /// Replaces the in-memory values with persisted ones, if any.
    pub async fn load(&mut self) {
        let saved: Option<FormValues> = self.store.get(&self.key, None).await;
        if let Some(saved) = saved {
            tracing::debug!(form_id = %self.form_id, "[SessionForm] Restored saved values");
            self.values = saved;
            self.is_pristine = false;
        }
    }

    pub fn set_value(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        self.values.insert(field.clone(), value);
        self.touched.insert(field);
        self.is_pristine = false;
        self.schedule();
    }

    pub fn touch(&mut self, field: impl Into<String>) {
        self.touched.insert(field.into());
    }

    fn schedule(&mut self) {
        if self.auto_save {
            let store = self.store.clone();
            let key = self.key.clone();
            let form_id = self.form_id.clone();
            let values = self.values.clone();
            self.saves.schedule(async move {
                if let Err(e) = store.set(&key, &values).await {
                    tracing::error!(form_id = %form_id, error = %e, "[SessionForm] Save failed");
                }
            });
        }

        if let Some(window) = &self.window {
            let context = json!({ "formId": self.form_id, "formState": self.values });
            if let Err(e) = window
                .create_debounced_recovery_point(format!("Form state: {}", self.form_id), Some(context))
            {
                tracing::warn!(form_id = %self.form_id, error = %e, "[SessionForm] Checkpoint failed");
            }
        }
    }

    /// Writes the current values now, superseding any pending write.
    pub async fn flush(&mut self) {
        self.saves.cancel().await;
        if let Err(e) = self.store.set(&self.key, &self.values).await {
            tracing::error!(form_id = %self.form_id, error = %e, "[SessionForm] Save failed");
        }
    }

    /// Back to the initial values, with nothing persisted.
    pub async fn reset(&mut self) {
        self.saves.cancel().await;
        self.values = self.initial.clone();
        self.errors.clear();
        self.touched.clear();
        self.is_pristine = true;
        self.clear_persisted().await;
    }

    /// Hands the values to `on_submit`. Success clears the persisted state;
    /// failure is recorded as the `"form"` error. Returns whether it succeeded.
    pub async fn submit<F, Fut, E>(&mut self, on_submit: F) -> bool
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        self.is_submitting = true;
        let outcome = on_submit(self.values.clone()).await;
        let succeeded = match outcome {
            Ok(()) => {
                self.saves.cancel().await;
                self.clear_persisted().await;
                self.errors.clear();
                self.is_pristine = true;
                true
            }
            Err(e) => {
                tracing::warn!(form_id = %self.form_id, error = %e, "[SessionForm] Submit failed");
                self.errors.insert("form".to_string(), e.to_string());
                false
            }
        };
        self.is_submitting = false;
        succeeded
    }

    async fn clear_persisted(&self) {
        if let Err(e) = self.store.remove(&self.key).await {
            tracing::error!(form_id = %self.form_id, error = %e, "[SessionForm] Clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{AutoSaveController, CountingReset, SessionManager};
    use waypoint_core::clock::SystemClock;
    use waypoint_core::config::AutoSaveConfig;
    use waypoint_infrastructure::MemoryStore;

    fn initial() -> FormValues {
        let mut values = FormValues::new();
        values.insert("title".to_string(), json!(""));
        values
    }

    fn form(store: Arc<MemoryStore>) -> SessionForm {
        SessionForm::new("task", initial(), store, &FormConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_debounced() {
        let store = Arc::new(MemoryStore::new());
        let mut form = form(store.clone());

        form.set_value("title", json!("a"));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        form.set_value("title", json!("ab"));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(store.get_raw("form:task").await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            store.get_raw("form:task").await.unwrap(),
            Some(json!({"title": "ab"}))
        );
        assert!(form.is_touched("title"));
        assert!(!form.is_pristine());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_auto_save_only_flush_writes() {
        let store = Arc::new(MemoryStore::new());
        let mut form = form(store.clone()).with_auto_save(false);

        form.set_value("title", json!("kept in memory"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get_raw("form:task").await.unwrap(), None);

        form.flush().await;
        assert_eq!(
            store.get_raw("form:task").await.unwrap(),
            Some(json!({"title": "kept in memory"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_burst_yields_one_form_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(
            Some("s-1".to_string()),
            store.clone(),
            Arc::new(SystemClock),
            Arc::new(CountingReset::new()),
            AutoSaveConfig::default(),
        );
        let (window, _task) =
            AutoSaveController::spawn(manager, None, &AutoSaveConfig::default());
        let mut form = form(store).with_checkpoints(window.clone());

        for title in ["a", "ab", "abc", "abcd"] {
            form.set_value("title", json!(title));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        let points = window.recovery_points().await.unwrap();
        let form_points: Vec<_> = points
            .iter()
            .filter(|p| p.description == "Form state: task")
            .collect();
        assert_eq!(form_points.len(), 1);
        assert_eq!(
            form_points[0].operation_context,
            Some(json!({"formId": "task", "formState": {"title": "abcd"}}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_restores_saved_values() {
        let store = Arc::new(MemoryStore::new());
        store.set("form:task", &json!({"title": "draft"})).await.unwrap();

        let mut form = form(store);
        form.load().await;
        assert_eq!(form.values()["title"], json!("draft"));
        assert!(!form.is_pristine());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_success_clears_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        let mut form = form(store.clone());
        form.set_value("title", json!("done"));
        form.flush().await;
        assert!(store.get_raw("form:task").await.unwrap().is_some());

        let ok = form
            .submit(|values| async move {
                assert_eq!(values["title"], json!("done"));
                Ok::<(), String>(())
            })
            .await;
        assert!(ok);
        assert!(form.is_pristine());
        assert!(!form.is_submitting());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get_raw("form:task").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_sets_form_error() {
        let store = Arc::new(MemoryStore::new());
        let mut form = form(store);
        form.set_value("title", json!("x"));

        let ok = form
            .submit(|_| async { Err::<(), _>("server rejected".to_string()) })
            .await;
        assert!(!ok);
        assert_eq!(form.errors().get("form").map(String::as_str), Some("server rejected"));
        assert!(!form.is_pristine());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_initial_values() {
        let store = Arc::new(MemoryStore::new());
        let mut form = form(store.clone());
        form.set_value("title", json!("x"));
        form.reset().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(form.values(), &initial());
        assert!(form.is_pristine());
        assert!(!form.is_touched("title"));
        assert_eq!(store.get_raw("form:task").await.unwrap(), None);
    }
}
