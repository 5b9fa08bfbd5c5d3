//! Self-populating cache in front of the store, kept fresh by bucket notifications.
//!
//! Reads are served from the backend only while the notification loop is
//! subscribed. Outside that window every read re-validates against the store,
//! because entries may have missed a change.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use bytes::Bytes;
use metrics::{counter, gauge, histogram};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ApiSpec, AsyncApiSpec, CacheKey, Content, Field, Notification, ODataSpec, OpenApiSpec,
};

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::signal::StopSignal;
use super::store::{ContentStore, StoreError};

pub(crate) const METRIC_HIT_TOTAL: &str = "content_cache_hit_total";
pub(crate) const METRIC_MISS_TOTAL: &str = "content_cache_miss_total";
pub(crate) const METRIC_STALE_BYPASS_TOTAL: &str = "content_cache_stale_bypass_total";
pub(crate) const METRIC_REFRESH_TOTAL: &str = "content_cache_refresh_total";
pub(crate) const METRIC_NOTIFICATION_MS: &str = "content_cache_notification_ms";
pub(crate) const METRIC_SYNCED: &str = "content_cache_synced";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to load `{key}` from the store: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("cache backend {op} failed for `{key}`: {source}")]
    Backend {
        key: String,
        op: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("failed to encode `{key}` for caching: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode cached `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn backend(key: impl Into<String>, op: &'static str, source: BackendError) -> Self {
        Self::Backend {
            key: key.into(),
            op,
            source,
        }
    }
}

#[derive(Debug, Default)]
struct SyncState {
    initialized: AtomicBool,
    enabled: AtomicBool,
}

struct Inner<S, B> {
    store: Arc<S>,
    backend: Arc<B>,
    config: CacheConfig,
    state: SyncState,
}

/// Cheap to clone; clones share backend, store and sync state.
pub struct ContentCache<S, B> {
    inner: Arc<Inner<S, B>>,
}

impl<S, B> Clone for ContentCache<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, B> ContentCache<S, B>
where
    S: ContentStore + 'static,
    B: CacheBackend + 'static,
{
    pub fn new(store: Arc<S>, backend: Arc<B>, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                config,
                state: SyncState::default(),
            }),
        }
    }

    /// Start the notification loop. Only the first call spawns it.
    pub fn initialize(&self, stop: StopSignal) -> Option<JoinHandle<()>> {
        if self.inner.state.initialized.swap(true, Ordering::AcqRel) {
            debug!("Cache already initialized");
            return None;
        }

        let cache = self.clone();
        Some(tokio::spawn(async move { cache.run(stop).await }))
    }

    /// Whether the notification loop is currently subscribed.
    ///
    /// Observable state for health checks, not a synchronization point.
    pub fn is_synced(&self) -> bool {
        self.inner.state.enabled.load(Ordering::Acquire)
    }

    pub async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, CacheError> {
        self.get(id, Field::ApiSpec).await
    }

    pub async fn open_api_spec(&self, id: &str) -> Result<Option<OpenApiSpec>, CacheError> {
        self.get(id, Field::OpenApiSpec).await
    }

    pub async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, CacheError> {
        self.get(id, Field::ODataSpec).await
    }

    pub async fn async_api_spec(&self, id: &str) -> Result<Option<AsyncApiSpec>, CacheError> {
        self.get(id, Field::AsyncApiSpec).await
    }

    pub async fn content(&self, id: &str) -> Result<Option<Content>, CacheError> {
        self.get(id, Field::Content).await
    }

    async fn get<T>(&self, id: &str, field: Field) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let key = CacheKey::new(id, field);
        let slot = key.to_string();

        match self.inner.backend.get(&slot) {
            Ok(bytes) if self.is_synced() => {
                counter!(METRIC_HIT_TOTAL, "field" => field.name()).increment(1);
                return decode(slot, &bytes).map(Some);
            }
            Ok(_) => {
                counter!(METRIC_STALE_BYPASS_TOTAL, "field" => field.name()).increment(1);
            }
            Err(err) if err.is_not_found() => {
                counter!(METRIC_MISS_TOTAL, "field" => field.name()).increment(1);
            }
            Err(source) => return Err(CacheError::backend(slot, "get", source)),
        }

        match self.update(&key).await? {
            Some(bytes) => decode(slot, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Re-fetch one key from the store and mirror the result into the backend.
    ///
    /// Returns the bytes read back from the backend after a write, not the
    /// freshly encoded value.
    async fn update(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let slot = key.to_string();
        let backend = &self.inner.backend;

        let Some(encoded) = self.load(key).await? else {
            match backend.delete(&slot) {
                Ok(()) => debug!(key = %slot, "Removed cache entry for missing object"),
                Err(err) if err.is_not_found() => {}
                Err(source) => return Err(CacheError::backend(slot, "delete", source)),
            }
            return Ok(None);
        };

        backend
            .set(&slot, encoded)
            .map_err(|source| CacheError::backend(slot.clone(), "set", source))?;

        match backend.get(&slot) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(source) => Err(CacheError::backend(slot, "get", source)),
        }
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let store = &self.inner.store;
        let id = key.id();

        counter!(METRIC_REFRESH_TOTAL, "field" => key.field().name()).increment(1);

        match key.field() {
            Field::ApiSpec => encode(key, store.api_spec(id).await),
            Field::OpenApiSpec => encode(key, store.open_api_spec(id).await),
            Field::ODataSpec => encode(key, store.odata_spec(id).await),
            Field::AsyncApiSpec => encode(key, store.async_api_spec(id).await),
            Field::Content => encode(key, store.content(id).await),
        }
    }

    async fn run(self, mut stop: StopSignal) {
        loop {
            if let Err(err) = self.inner.backend.reset() {
                error!(
                    error = %err,
                    "Cache reset failed; serving every read from the store until restart"
                );
                return;
            }

            let mut notifications = self.inner.store.notification_channel(stop.clone()).await;
            self.set_synced(true);
            info!("Subscribed to bucket notifications");

            loop {
                tokio::select! {
                    received = notifications.recv() => match received {
                        Some(notification) => self.apply(&notification).await,
                        None => break,
                    },
                    () = stop.stopped() => break,
                }
            }

            self.set_synced(false);

            if stop.is_stopped() {
                info!("Notification loop stopped");
                return;
            }

            let backoff = self.inner.config.reconnect_backoff;
            warn!(
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "Notification stream closed; resubscribing after backoff"
            );

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = stop.stopped() => {
                    info!("Notification loop stopped during backoff");
                    return;
                }
            }
        }
    }

    async fn apply(&self, notification: &Notification) {
        let fields = Field::for_filename(&notification.filename);
        if fields.is_empty() {
            debug!(
                parent = %notification.parent,
                filename = %notification.filename,
                "Ignoring notification for untracked object"
            );
            return;
        }

        let started_at = Instant::now();
        for &field in fields {
            let key = CacheKey::new(notification.parent.as_str(), field);
            match self.update(&key).await {
                Ok(stored) => debug!(key = %key, exists = stored.is_some(), "Refreshed cache entry"),
                Err(err) => warn!(key = %key, error = %err, "Failed to refresh cache entry"),
            }
        }

        info!(
            parent = %notification.parent,
            filename = %notification.filename,
            event = %notification.event,
            fields = fields.len(),
            "Applied bucket notification"
        );
        histogram!(METRIC_NOTIFICATION_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
    }

    fn set_synced(&self, synced: bool) {
        self.inner.state.enabled.store(synced, Ordering::Release);
        gauge!(METRIC_SYNCED).set(if synced { 1.0 } else { 0.0 });
    }
}

fn encode<T>(key: &CacheKey, fetched: Result<Option<T>, StoreError>) -> Result<Option<Bytes>, CacheError>
where
    T: Serialize,
{
    let value = fetched.map_err(|source| CacheError::Store {
        key: key.to_string(),
        source,
    })?;

    let Some(value) = value else {
        return Ok(None);
    };

    serde_json::to_vec(&value)
        .map(|encoded| Some(Bytes::from(encoded)))
        .map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })
}

fn decode<T>(key: String, bytes: &[u8]) -> Result<T, CacheError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(|source| CacheError::Decode { key, source })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{ContentData, EventType, RawObject};
    use crate::storage::client::ObjectError;
    use crate::storage::signal::{StopHandle, stop_signal};

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Answer {
        Exists,
        Missing,
        Fail,
    }

    /// Store double answering every lookup the same way and counting calls.
    struct CountingStore {
        answer: Mutex<Answer>,
        calls: Mutex<Vec<(String, Field)>>,
        subscriptions: AtomicUsize,
        sender: Mutex<Option<mpsc::Sender<Notification>>>,
    }

    impl CountingStore {
        fn new(answer: Answer) -> Self {
            Self {
                answer: Mutex::new(answer),
                calls: Mutex::new(Vec::new()),
                subscriptions: AtomicUsize::new(0),
                sender: Mutex::new(None),
            }
        }

        fn answer_with(&self, answer: Answer) {
            *self.answer.lock().expect("answer lock") = answer;
        }

        fn calls(&self) -> Vec<(String, Field)> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn sender(&self) -> mpsc::Sender<Notification> {
            self.sender
                .lock()
                .expect("sender lock")
                .clone()
                .expect("subscribed")
        }

        fn close_stream(&self) {
            self.sender.lock().expect("sender lock").take();
        }

        fn respond<T>(&self, id: &str, field: Field, value: T) -> Result<Option<T>, StoreError> {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push((id.to_string(), field));
            match *self.answer.lock().expect("answer lock") {
                Answer::Exists => Ok(Some(value)),
                Answer::Missing => Ok(None),
                Answer::Fail => Err(StoreError::Fetch {
                    key: format!("{id}/{}", field.filename()),
                    source: ObjectError::request("object store unavailable"),
                }),
            }
        }

        fn raw(&self, id: &str) -> RawObject {
            let version = self.calls.lock().expect("calls lock").len();
            json!({"id": id, "version": version})
                .as_object()
                .cloned()
                .expect("object")
        }
    }

    #[async_trait]
    impl ContentStore for CountingStore {
        async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, StoreError> {
            let raw = self.raw(id);
            self.respond(id, Field::ApiSpec, ApiSpec { raw })
        }

        async fn open_api_spec(&self, id: &str) -> Result<Option<OpenApiSpec>, StoreError> {
            let raw = self.raw(id);
            self.respond(id, Field::OpenApiSpec, OpenApiSpec { raw })
        }

        async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, StoreError> {
            let raw = format!("<edmx:Edmx id=\"{id}\"/>");
            self.respond(id, Field::ODataSpec, ODataSpec { raw })
        }

        async fn async_api_spec(&self, id: &str) -> Result<Option<AsyncApiSpec>, StoreError> {
            let raw = self.raw(id);
            self.respond(
                id,
                Field::AsyncApiSpec,
                AsyncApiSpec {
                    raw,
                    data: Default::default(),
                },
            )
        }

        async fn content(&self, id: &str) -> Result<Option<Content>, StoreError> {
            let raw = self.raw(id);
            let data = ContentData {
                id: id.to_string(),
                ..Default::default()
            };
            self.respond(id, Field::Content, Content { raw, data })
        }

        async fn notification_channel(&self, _stop: StopSignal) -> mpsc::Receiver<Notification> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(8);
            *self.sender.lock().expect("sender lock") = Some(tx);
            rx
        }
    }

    #[derive(Default)]
    struct Failures {
        get: bool,
        set: bool,
        delete: bool,
        reset: bool,
        reread: bool,
    }

    /// Map-backed backend with switchable failures.
    #[derive(Default)]
    struct ScriptedBackend {
        entries: Mutex<HashMap<String, Bytes>>,
        failures: Mutex<Failures>,
        resets: AtomicUsize,
        sets: AtomicUsize,
    }

    impl ScriptedBackend {
        fn failing(configure: impl FnOnce(&mut Failures)) -> Self {
            let backend = Self::default();
            configure(&mut backend.failures.lock().expect("failures lock"));
            backend
        }

        fn insert(&self, key: &str, value: serde_json::Value) {
            self.entries
                .lock()
                .expect("entries lock")
                .insert(key.to_string(), Bytes::from(value.to_string()));
        }

        fn contains(&self, key: &str) -> bool {
            self.entries.lock().expect("entries lock").contains_key(key)
        }

        fn entry(&self, key: &str) -> Option<serde_json::Value> {
            let entries = self.entries.lock().expect("entries lock");
            entries
                .get(key)
                .map(|bytes| serde_json::from_slice(bytes).expect("entry is JSON"))
        }

        fn unavailable() -> BackendError {
            BackendError::unavailable("scripted failure")
        }
    }

    impl CacheBackend for ScriptedBackend {
        fn get(&self, key: &str) -> Result<Bytes, BackendError> {
            let failures = self.failures.lock().expect("failures lock");
            if failures.get || (failures.reread && self.sets.load(Ordering::SeqCst) > 0) {
                return Err(Self::unavailable());
            }
            self.entries
                .lock()
                .expect("entries lock")
                .get(key)
                .cloned()
                .ok_or_else(|| BackendError::not_found(key))
        }

        fn set(&self, key: &str, value: Bytes) -> Result<(), BackendError> {
            if self.failures.lock().expect("failures lock").set {
                return Err(Self::unavailable());
            }
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.entries
                .lock()
                .expect("entries lock")
                .insert(key.to_string(), value);
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<(), BackendError> {
            if self.failures.lock().expect("failures lock").delete {
                return Err(Self::unavailable());
            }
            self.entries
                .lock()
                .expect("entries lock")
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| BackendError::not_found(key))
        }

        fn reset(&self) -> Result<(), BackendError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.failures.lock().expect("failures lock").reset {
                return Err(Self::unavailable());
            }
            self.entries.lock().expect("entries lock").clear();
            Ok(())
        }
    }

    type TestCache = ContentCache<CountingStore, ScriptedBackend>;

    fn cache(store: &Arc<CountingStore>, backend: &Arc<ScriptedBackend>) -> TestCache {
        ContentCache::new(
            Arc::clone(store),
            Arc::clone(backend),
            CacheConfig {
                reconnect_backoff: Duration::from_millis(20),
                ..Default::default()
            },
        )
    }

    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting until {what}");
    }

    async fn synced(
        store: &Arc<CountingStore>,
        backend: &Arc<ScriptedBackend>,
    ) -> (TestCache, StopHandle) {
        let cache = cache(store, backend);
        let (handle, signal) = stop_signal();
        cache.initialize(signal).expect("first initialize spawns");
        wait_until("cache is synced", || cache.is_synced()).await;
        (cache, handle)
    }

    #[tokio::test]
    async fn hit_while_synced_skips_store() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (cache, _stop) = synced(&store, &backend).await;
        backend.insert("valid/apiSpec.json/apiSpec", json!({"raw": {"cached": true}}));

        let spec = cache.api_spec("valid").await.expect("api spec");

        assert_eq!(spec.expect("exists").raw["cached"], json!(true));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn miss_fills_cache_once_while_synced() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (cache, _stop) = synced(&store, &backend).await;

        let first = cache.content("valid").await.expect("first fetch");
        let second = cache.content("valid").await.expect("second fetch");

        assert_eq!(first, second);
        assert_eq!(first.expect("exists").data.id, "valid");
        assert_eq!(store.calls(), vec![("valid".to_string(), Field::Content)]);
        assert!(backend.contains("valid/content.json/content"));
    }

    #[tokio::test]
    async fn stale_entry_is_revalidated_when_not_synced() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let cache = cache(&store, &backend);
        backend.insert("valid/apiSpec.json/openApiSpec", json!({"raw": {"stale": true}}));

        let spec = cache
            .open_api_spec("valid")
            .await
            .expect("open api spec")
            .expect("exists");

        assert_eq!(spec.raw["id"], json!("valid"));
        assert!(spec.raw.get("stale").is_none());
        assert_eq!(store.calls().len(), 1);

        let entry = backend
            .entry("valid/apiSpec.json/openApiSpec")
            .expect("entry rewritten");
        assert_eq!(entry["raw"]["id"], json!("valid"));
        assert!(entry["raw"].get("stale").is_none());

        let again = cache.open_api_spec("valid").await.expect("again");
        assert!(again.is_some());
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn missing_object_clears_stale_entry() {
        let store = Arc::new(CountingStore::new(Answer::Missing));
        let backend = Arc::new(ScriptedBackend::default());
        let cache = cache(&store, &backend);
        backend.insert("gone/asyncApiSpec.json/asyncApiSpec", json!({"raw": {}, "data": {}}));

        let spec = cache.async_api_spec("gone").await.expect("absent");

        assert_eq!(spec, None);
        assert!(!backend.contains("gone/asyncApiSpec.json/asyncApiSpec"));
    }

    #[tokio::test]
    async fn missing_object_without_entry_is_not_an_error() {
        let store = Arc::new(CountingStore::new(Answer::Missing));
        let backend = Arc::new(ScriptedBackend::default());

        let spec = cache(&store, &backend).odata_spec("never").await;

        assert_eq!(spec.expect("absent"), None);
    }

    #[tokio::test]
    async fn delete_failure_is_propagated() {
        let store = Arc::new(CountingStore::new(Answer::Missing));
        let backend = Arc::new(ScriptedBackend::failing(|f| f.delete = true));

        let err = cache(&store, &backend)
            .content("gone")
            .await
            .expect_err("delete failure");

        assert!(matches!(err, CacheError::Backend { op: "delete", .. }));
    }

    #[tokio::test]
    async fn store_error_is_propagated_without_touching_backend() {
        let store = Arc::new(CountingStore::new(Answer::Fail));
        let backend = Arc::new(ScriptedBackend::default());

        let err = cache(&store, &backend)
            .api_spec("valid")
            .await
            .expect_err("store failure");

        assert!(matches!(err, CacheError::Store { ref key, .. } if key == "valid/apiSpec.json/apiSpec"));
        assert_eq!(backend.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_read_error_skips_store() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::failing(|f| f.get = true));

        let err = cache(&store, &backend)
            .api_spec("valid")
            .await
            .expect_err("backend failure");

        assert!(matches!(err, CacheError::Backend { op: "get", .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn backend_write_error_is_propagated() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::failing(|f| f.set = true));

        let err = cache(&store, &backend)
            .content("valid")
            .await
            .expect_err("set failure");

        assert!(matches!(err, CacheError::Backend { op: "set", .. }));
    }

    #[tokio::test]
    async fn error_reading_back_after_update_is_propagated() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::failing(|f| f.reread = true));

        let err = cache(&store, &backend)
            .content("valid")
            .await
            .expect_err("re-read failure");

        assert!(matches!(err, CacheError::Backend { op: "get", .. }));
        assert_eq!(backend.sets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupted_entry_is_a_decode_error() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (cache, _stop) = synced(&store, &backend).await;
        backend.insert("valid/content.json/content", json!(["not", "content"]));

        let err = cache.content("valid").await.expect_err("decode failure");

        assert!(matches!(err, CacheError::Decode { .. }));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let cache = cache(&store, &backend);
        let (handle, signal) = stop_signal();

        let first = cache.initialize(signal.clone());
        let second = cache.initialize(signal);
        wait_until("cache is synced", || cache.is_synced()).await;

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(backend.resets.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriptions.load(Ordering::SeqCst), 1);

        handle.stop();
        first
            .expect("loop handle")
            .await
            .expect("loop exits cleanly");
        assert!(!cache.is_synced());
    }

    #[tokio::test]
    async fn reset_failure_disables_caching_for_good() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::failing(|f| f.reset = true));
        let cache = cache(&store, &backend);
        let (_handle, signal) = stop_signal();

        cache
            .initialize(signal)
            .expect("loop handle")
            .await
            .expect("loop exits after reset failure");

        assert!(!cache.is_synced());
        assert_eq!(store.subscriptions.load(Ordering::SeqCst), 0);

        cache.content("valid").await.expect("first read");
        cache.content("valid").await.expect("second read");
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn notification_refreshes_every_field_of_the_file() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (cache, _stop) = synced(&store, &backend).await;

        store
            .sender()
            .send(Notification::from_key("P/apiSpec.json", EventType::Created))
            .await
            .expect("send notification");
        wait_until("odata entry refreshed", || {
            backend.contains("P/apiSpec.json/odataSpec")
        })
        .await;

        assert_eq!(
            store.calls(),
            vec![
                ("P".to_string(), Field::ApiSpec),
                ("P".to_string(), Field::OpenApiSpec),
                ("P".to_string(), Field::ODataSpec),
            ]
        );
        assert!(backend.contains("P/apiSpec.json/apiSpec"));
        assert!(backend.contains("P/apiSpec.json/openApiSpec"));
        assert!(backend.contains("P/apiSpec.json/odataSpec"));

        let spec = cache.odata_spec("P").await.expect("cached").expect("exists");
        assert_eq!(spec.raw, "<edmx:Edmx id=\"P\"/>");
        assert_eq!(store.calls().len(), 3);
    }

    #[tokio::test]
    async fn removal_notification_evicts_entries() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (cache, _stop) = synced(&store, &backend).await;
        cache.content("P").await.expect("fill");
        assert!(backend.contains("P/content.json/content"));

        store.answer_with(Answer::Missing);
        store
            .sender()
            .send(Notification::from_key("P/content.json", EventType::Removed))
            .await
            .expect("send notification");
        wait_until("entry removed", || !backend.contains("P/content.json/content")).await;

        assert_eq!(cache.content("P").await.expect("absent"), None);
    }

    #[tokio::test]
    async fn untracked_files_are_ignored() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (_cache, _stop) = synced(&store, &backend).await;
        let sender = store.sender();

        sender
            .send(Notification::from_key("P/README.md", EventType::Created))
            .await
            .expect("send untracked");
        sender
            .send(Notification::from_key("P/content.json", EventType::Created))
            .await
            .expect("send tracked");
        wait_until("content refreshed", || !store.calls().is_empty()).await;

        assert_eq!(store.calls(), vec![("P".to_string(), Field::Content)]);
    }

    #[tokio::test]
    async fn closed_stream_resets_and_resubscribes() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let (cache, _stop) = synced(&store, &backend).await;
        cache.content("P").await.expect("fill");

        store.close_stream();
        wait_until("resubscribed", || {
            store.subscriptions.load(Ordering::SeqCst) == 2
        })
        .await;
        wait_until("synced again", || cache.is_synced()).await;

        assert_eq!(backend.resets.load(Ordering::SeqCst), 2);
        assert!(!backend.contains("P/content.json/content"));
    }

    #[tokio::test]
    async fn stop_during_backoff_ends_loop() {
        let store = Arc::new(CountingStore::new(Answer::Exists));
        let backend = Arc::new(ScriptedBackend::default());
        let cache = ContentCache::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            CacheConfig {
                reconnect_backoff: Duration::from_secs(3600),
                ..Default::default()
            },
        );
        let (handle, signal) = stop_signal();
        let task = cache.initialize(signal).expect("loop handle");
        wait_until("cache is synced", || cache.is_synced()).await;

        store.close_stream();
        wait_until("stream closed", || !cache.is_synced()).await;
        handle.stop();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should stop promptly")
            .expect("loop exits cleanly");
        assert_eq!(store.subscriptions.load(Ordering::SeqCst), 1);
    }
}
