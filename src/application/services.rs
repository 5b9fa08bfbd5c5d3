//! Per-kind lookup services in front of the content cache.
//!
//! Every service composes `{kind}/{id}` and asks the cache for one field.
//! Absence is `Ok(None)`; cache errors pass through unchanged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ApiSpec, AsyncApiSpec, Content, ODataSpec, OpenApiSpec};
use crate::storage::{CacheBackend, CacheError, ContentCache, ContentStore};

#[async_trait]
pub trait ContentGetter: Send + Sync {
    async fn content(&self, id: &str) -> Result<Option<Content>, CacheError>;
}

#[async_trait]
pub trait ApiSpecGetter: Send + Sync {
    async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, CacheError>;
}

#[async_trait]
pub trait OpenApiSpecGetter: Send + Sync {
    async fn open_api_spec(&self, id: &str) -> Result<Option<OpenApiSpec>, CacheError>;
}

#[async_trait]
pub trait AsyncApiSpecGetter: Send + Sync {
    async fn async_api_spec(&self, id: &str) -> Result<Option<AsyncApiSpec>, CacheError>;
}

#[async_trait]
pub trait ODataSpecGetter: Send + Sync {
    async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, CacheError>;
}

#[async_trait]
impl<S, B> ContentGetter for ContentCache<S, B>
where
    S: ContentStore + 'static,
    B: CacheBackend + 'static,
{
    async fn content(&self, id: &str) -> Result<Option<Content>, CacheError> {
        ContentCache::content(self, id).await
    }
}

#[async_trait]
impl<S, B> ApiSpecGetter for ContentCache<S, B>
where
    S: ContentStore + 'static,
    B: CacheBackend + 'static,
{
    async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, CacheError> {
        ContentCache::api_spec(self, id).await
    }
}

#[async_trait]
impl<S, B> OpenApiSpecGetter for ContentCache<S, B>
where
    S: ContentStore + 'static,
    B: CacheBackend + 'static,
{
    async fn open_api_spec(&self, id: &str) -> Result<Option<OpenApiSpec>, CacheError> {
        ContentCache::open_api_spec(self, id).await
    }
}

#[async_trait]
impl<S, B> AsyncApiSpecGetter for ContentCache<S, B>
where
    S: ContentStore + 'static,
    B: CacheBackend + 'static,
{
    async fn async_api_spec(&self, id: &str) -> Result<Option<AsyncApiSpec>, CacheError> {
        ContentCache::async_api_spec(self, id).await
    }
}

#[async_trait]
impl<S, B> ODataSpecGetter for ContentCache<S, B>
where
    S: ContentStore + 'static,
    B: CacheBackend + 'static,
{
    async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, CacheError> {
        ContentCache::odata_spec(self, id).await
    }
}

fn lookup_key(kind: &str, id: &str) -> String {
    format!("{kind}/{id}")
}

#[derive(Clone)]
pub struct ContentService {
    getter: Arc<dyn ContentGetter>,
}

impl ContentService {
    pub fn new(getter: Arc<dyn ContentGetter>) -> Self {
        Self { getter }
    }

    pub async fn find(&self, kind: &str, id: &str) -> Result<Option<Content>, CacheError> {
        self.getter.content(&lookup_key(kind, id)).await
    }
}

#[derive(Clone)]
pub struct ApiSpecService {
    getter: Arc<dyn ApiSpecGetter>,
}

impl ApiSpecService {
    pub fn new(getter: Arc<dyn ApiSpecGetter>) -> Self {
        Self { getter }
    }

    pub async fn find(&self, kind: &str, id: &str) -> Result<Option<ApiSpec>, CacheError> {
        self.getter.api_spec(&lookup_key(kind, id)).await
    }
}

#[derive(Clone)]
pub struct OpenApiSpecService {
    getter: Arc<dyn OpenApiSpecGetter>,
}

impl OpenApiSpecService {
    pub fn new(getter: Arc<dyn OpenApiSpecGetter>) -> Self {
        Self { getter }
    }

    pub async fn find(&self, kind: &str, id: &str) -> Result<Option<OpenApiSpec>, CacheError> {
        self.getter.open_api_spec(&lookup_key(kind, id)).await
    }
}

#[derive(Clone)]
pub struct AsyncApiSpecService {
    getter: Arc<dyn AsyncApiSpecGetter>,
}

impl AsyncApiSpecService {
    pub fn new(getter: Arc<dyn AsyncApiSpecGetter>) -> Self {
        Self { getter }
    }

    pub async fn find(&self, kind: &str, id: &str) -> Result<Option<AsyncApiSpec>, CacheError> {
        self.getter.async_api_spec(&lookup_key(kind, id)).await
    }
}

#[derive(Clone)]
pub struct ODataSpecService {
    getter: Arc<dyn ODataSpecGetter>,
}

impl ODataSpecService {
    pub fn new(getter: Arc<dyn ODataSpecGetter>) -> Self {
        Self { getter }
    }

    pub async fn find(&self, kind: &str, id: &str) -> Result<Option<ODataSpec>, CacheError> {
        self.getter.odata_spec(&lookup_key(kind, id)).await
    }
}

/// All five services backed by one cache.
#[derive(Clone)]
pub struct ContentServices {
    pub content: ContentService,
    pub api_spec: ApiSpecService,
    pub open_api_spec: OpenApiSpecService,
    pub async_api_spec: AsyncApiSpecService,
    pub odata_spec: ODataSpecService,
}

impl ContentServices {
    pub fn new<S, B>(cache: ContentCache<S, B>) -> Self
    where
        S: ContentStore + 'static,
        B: CacheBackend + 'static,
    {
        let cache = Arc::new(cache);
        Self {
            content: ContentService::new(cache.clone()),
            api_spec: ApiSpecService::new(cache.clone()),
            open_api_spec: OpenApiSpecService::new(cache.clone()),
            async_api_spec: AsyncApiSpecService::new(cache.clone()),
            odata_spec: ODataSpecService::new(cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::domain::{ContentData, RawObject};
    use crate::storage::BackendError;

    #[derive(Default)]
    struct RecordingGetter {
        requested: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingGetter {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn record(&self, id: &str) -> Result<(), CacheError> {
            self.requested.lock().expect("lock").push(id.to_string());
            if self.fail {
                return Err(CacheError::Backend {
                    key: format!("{id}/content.json/content"),
                    op: "get",
                    source: BackendError::unavailable("offline"),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContentGetter for RecordingGetter {
        async fn content(&self, id: &str) -> Result<Option<Content>, CacheError> {
            self.record(id)?;
            if id == "missing/none" {
                return Ok(None);
            }
            Ok(Some(Content {
                raw: RawObject::new(),
                data: ContentData {
                    id: id.to_string(),
                    ..Default::default()
                },
            }))
        }
    }

    #[async_trait]
    impl ApiSpecGetter for RecordingGetter {
        async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, CacheError> {
            self.record(id)?;
            let raw = json!({ "openapi": "3.0.0" });
            Ok(Some(ApiSpec {
                raw: raw.as_object().cloned().unwrap_or_default(),
            }))
        }
    }

    #[async_trait]
    impl ODataSpecGetter for RecordingGetter {
        async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, CacheError> {
            self.record(id)?;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn find_composes_kind_and_id() {
        let getter = Arc::new(RecordingGetter::default());
        let service = ContentService::new(getter.clone());

        let content = service
            .find("service-class", "redis")
            .await
            .expect("lookup")
            .expect("content");

        assert_eq!(content.data.id, "service-class/redis");
        assert_eq!(
            *getter.requested.lock().expect("lock"),
            vec!["service-class/redis".to_string()]
        );
    }

    #[tokio::test]
    async fn absence_is_not_an_error() {
        let service = ContentService::new(Arc::new(RecordingGetter::default()));
        assert!(service.find("missing", "none").await.expect("lookup").is_none());

        let odata = ODataSpecService::new(Arc::new(RecordingGetter::default()));
        assert!(odata.find("service-class", "redis").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let service = ApiSpecService::new(Arc::new(RecordingGetter::failing()));

        let err = service
            .find("service-class", "redis")
            .await
            .expect_err("backend failure");

        assert!(matches!(err, CacheError::Backend { op: "get", .. }));
    }

    #[tokio::test]
    async fn api_spec_is_returned_as_is() {
        let service = ApiSpecService::new(Arc::new(RecordingGetter::default()));

        let spec = service
            .find("addon", "mongo")
            .await
            .expect("lookup")
            .expect("spec");

        assert_eq!(spec.raw.get("openapi"), Some(&json!("3.0.0")));
    }
}
