use crate::core::error::{DetachError, FetchError};
use crate::core::models::SERVER_UP_PATH;
use crate::core::transport::Transport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Data differs from what was held before.
    Change,
    /// A fetch completed successfully.
    Sync,
    /// A fetch with `reset` replaced the whole collection.
    Reset,
    Destroy,
}

#[derive(Debug, Clone)]
pub struct ModelEvent {
    pub kind: EventKind,
    pub url: String,
}

pub type Listener = Arc<dyn Fn(&ModelEvent) + Send + Sync>;

/// Options forwarded to a resource's fetch. Completion is reported through the
/// returned result, so there is nowhere to pass success or error handlers.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub reset: bool,
    pub query: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn reset() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }
}

/// A client-side mirror of one server resource.
#[async_trait]
pub trait Resource: Send + Sync {
    fn url(&self) -> &str;

    async fn fetch(&self, options: &FetchOptions) -> Result<Value, FetchError>;
}

#[derive(Default)]
struct ModelState {
    data: Option<Value>,
    last_synced: Option<DateTime<Utc>>,
    destroyed: bool,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, EventKind, Listener)>,
}

pub struct Model {
    path: String,
    transport: Arc<dyn Transport>,
    state: RwLock<ModelState>,
    listeners: Mutex<Listeners>,
}

impl Model {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            transport,
            state: RwLock::new(ModelState::default()),
            listeners: Mutex::new(Listeners::default()),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> Option<Value> {
        self.read_state().data.clone()
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.read_state().last_synced
    }

    pub fn is_destroyed(&self) -> bool {
        self.read_state().destroyed
    }

    /// Replaces the data locally, without talking to the server.
    pub fn set(&self, data: Value) {
        let changed = {
            let mut state = self.write_state();
            let changed = state.data.as_ref() != Some(&data);
            state.data = Some(data);
            changed
        };
        if changed {
            self.emit(EventKind::Change);
        }
    }

    pub fn destroy(&self) {
        {
            let mut state = self.write_state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        tracing::debug!(path = %self.path, "Model destroyed");
        self.emit(EventKind::Destroy);
    }

    pub fn on(self: &Arc<Self>, kind: EventKind, listener: Listener) -> Subscription {
        let mut listeners = self.lock_listeners();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, kind, listener));

        Subscription {
            model: Arc::downgrade(self),
            path: self.path.clone(),
            id,
        }
    }

    #[allow(dead_code)]
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().entries.len()
    }

    fn off(&self, id: u64) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    /// Listeners run with no lock held, so a listener may unsubscribe itself
    /// or tear down the view that owns it.
    fn emit(&self, kind: EventKind) {
        let matching: Vec<Listener> = self
            .lock_listeners()
            .entries
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();

        let event = ModelEvent {
            kind,
            url: self.path.clone(),
        };
        for listener in matching {
            listener(&event);
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ModelState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Resource for Model {
    fn url(&self) -> &str {
        &self.path
    }

    async fn fetch(&self, options: &FetchOptions) -> Result<Value, FetchError> {
        if self.is_destroyed() {
            return Err(FetchError::Destroyed(self.path.clone()));
        }

        let data = self.transport.get_json(&self.path, &options.query).await?;

        let changed = {
            let mut state = self.write_state();
            if state.destroyed {
                return Err(FetchError::Destroyed(self.path.clone()));
            }
            let changed = state.data.as_ref() != Some(&data);
            state.data = Some(data.clone());
            state.last_synced = Some(Utc::now());
            changed
        };

        if options.reset {
            self.emit(EventKind::Reset);
        } else if changed {
            self.emit(EventKind::Change);
        }
        self.emit(EventKind::Sync);

        Ok(data)
    }
}

/// Handle to one listener registered with [`Model::on`].
pub struct Subscription {
    model: Weak<Model>,
    path: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) -> Result<(), DetachError> {
        let model = self
            .model
            .upgrade()
            .ok_or_else(|| DetachError::ModelGone(self.path.clone()))?;
        model.off(self.id);
        Ok(())
    }
}

/// Shared models, created on first use and destroyed by [`ModelRegistry::shutdown`].
pub struct ModelRegistry {
    transport: Arc<dyn Transport>,
    models: Mutex<HashMap<String, Arc<Model>>>,
}

impl ModelRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn model(&self, path: &str) -> Arc<Model> {
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            models
                .entry(path.to_string())
                .or_insert_with(|| Model::new(Arc::clone(&self.transport), path)),
        )
    }

    pub fn server_status(&self) -> Arc<Model> {
        self.model(SERVER_UP_PATH)
    }

    pub fn len(&self) -> usize {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn shutdown(&self) {
        let models: Vec<Arc<Model>> = self
            .models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, model)| model)
            .collect();

        tracing::info!(count = models.len(), "Shutting down shared models");
        for model in models {
            model.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::fake::ScriptedTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(model: &Arc<Model>, kind: EventKind) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sub = model.on(
            kind,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (count, sub)
    }

    #[tokio::test]
    async fn test_fetch_emits_change_only_when_data_differs() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .reply("v1/server/up", json!(false))
            .reply("v1/server/up", json!(false))
            .reply("v1/server/up", json!(true));
        let model = Model::new(transport, "v1/server/up");

        let (changes, _c) = counter(&model, EventKind::Change);
        let (syncs, _s) = counter(&model, EventKind::Sync);

        model.fetch(&FetchOptions::default()).await.unwrap();
        model.fetch(&FetchOptions::default()).await.unwrap();
        model.fetch(&FetchOptions::default()).await.unwrap();

        assert_eq!(changes.load(Ordering::SeqCst), 2);
        assert_eq!(syncs.load(Ordering::SeqCst), 3);
        assert_eq!(model.data(), Some(json!(true)));
        assert!(model.last_synced().is_some());
    }

    #[tokio::test]
    async fn test_reset_fetch_emits_reset() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("v1/applications", json!([{"id": "a1"}]));
        let model = Model::new(transport, "v1/applications");

        let (resets, _r) = counter(&model, EventKind::Reset);
        let (changes, _c) = counter(&model, EventKind::Change);

        model.fetch(&FetchOptions::reset()).await.unwrap();

        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_data() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .reply("v1/server/up", json!(true))
            .fail("v1/server/up", 500);
        let model = Model::new(transport, "v1/server/up");

        model.fetch(&FetchOptions::default()).await.unwrap();
        assert!(model.fetch(&FetchOptions::default()).await.is_err());
        assert_eq!(model.data(), Some(json!(true)));
    }

    #[test]
    fn test_local_set_notifies_change() {
        let model = Model::new(Arc::new(ScriptedTransport::new()), "v1/applications");
        let (changes, _c) = counter(&model, EventKind::Change);

        model.set(json!([]));
        model.set(json!([]));
        model.set(json!([{"id": "x"}]));

        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let model = Model::new(Arc::new(ScriptedTransport::new()), "v1/applications");
        let (changes, sub) = counter(&model, EventKind::Change);

        model.set(json!(1));
        sub.unsubscribe().unwrap();
        model.set(json!(2));

        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert_eq!(model.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let model = Model::new(Arc::new(ScriptedTransport::new()), "v1/applications");
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);

        let sub = model.on(
            EventKind::Change,
            Arc::new(move |_| {
                if let Some(sub) = slot_clone.lock().unwrap().take() {
                    sub.unsubscribe().unwrap();
                }
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        model.set(json!(1));
        model.set(json!(2));
        assert_eq!(model.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_after_model_dropped_reports_error() {
        let model = Model::new(Arc::new(ScriptedTransport::new()), "v1/applications");
        let (_count, sub) = counter(&model, EventKind::Change);
        drop(model);

        assert!(matches!(sub.unsubscribe(), Err(DetachError::ModelGone(_))));
    }

    #[tokio::test]
    async fn test_destroyed_model_refuses_fetch() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("v1/server/up", json!(true));
        let model = Model::new(transport.clone(), "v1/server/up");
        let (destroys, _d) = counter(&model, EventKind::Destroy);

        model.destroy();
        model.destroy();

        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        assert!(matches!(
            model.fetch(&FetchOptions::default()).await,
            Err(FetchError::Destroyed(_))
        ));
        assert_eq!(transport.requests("v1/server/up"), 0);
    }

    #[test]
    fn test_registry_shares_models() {
        let registry = ModelRegistry::new(Arc::new(ScriptedTransport::new()));

        let a = registry.server_status();
        let b = registry.model(SERVER_UP_PATH);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.model("v1/applications");
        assert_eq!(registry.len(), 2);

        registry.shutdown();
        assert_eq!(registry.len(), 0);
        assert!(a.is_destroyed());
    }
}
