//! Typed access to the documents kept in the content bucket.

use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::{Reader, events::Event};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{
    ApiSpec, AsyncApiSpec, AsyncApiSpecData, Content, ContentData, Field, Notification,
    ODataSpec, OpenApiSpec, RawObject,
};

use super::assets::AssetRewriter;
use super::client::{ObjectClient, ObjectError};
use super::config::StoreConfig;
use super::signal::StopSignal;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML document has no root element")]
    MissingRoot,
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to fetch object `{key}`: {source}")]
    Fetch {
        key: String,
        #[source]
        source: ObjectError,
    },
    #[error("failed to read object `{key}`: {source}")]
    Read {
        key: String,
        #[source]
        source: ObjectError,
    },
    #[error("failed to decode object `{key}` as {field}: {source}")]
    Decode {
        key: String,
        field: Field,
        #[source]
        source: DecodeError,
    },
}

/// Per-field document lookups plus the bucket's change feed.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, StoreError>;
    async fn open_api_spec(&self, id: &str) -> Result<Option<OpenApiSpec>, StoreError>;
    async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, StoreError>;
    async fn async_api_spec(&self, id: &str) -> Result<Option<AsyncApiSpec>, StoreError>;
    async fn content(&self, id: &str) -> Result<Option<Content>, StoreError>;
    async fn notification_channel(&self, stop: StopSignal) -> mpsc::Receiver<Notification>;
}

/// Decodes objects fetched through an [`ObjectClient`].
pub struct Store {
    client: Arc<dyn ObjectClient>,
    config: StoreConfig,
}

impl Store {
    pub fn new(client: Arc<dyn ObjectClient>, config: StoreConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn fetch<T, F>(&self, id: &str, field: Field, decode: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(&[u8]) -> Result<T, DecodeError> + Send,
    {
        let key = format!("{id}/{}", field.filename());
        let bucket = self.config.bucket.as_str();

        let reader = self
            .client
            .object(bucket, &key)
            .await
            .map_err(|source| StoreError::Fetch {
                key: key.clone(),
                source,
            })?;

        let body = match reader.read_all().await {
            Ok(body) => body,
            Err(err) if self.client.is_not_exists_error(&err) => {
                debug!(bucket, key = %key, "object not found");
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Read { key, source }),
        };

        match decode(&body) {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.client.is_not_exists_error(&err) => {
                debug!(bucket, key = %key, "object not found");
                Ok(None)
            }
            Err(source) => Err(StoreError::Decode { key, field, source }),
        }
    }

    fn decode_content(&self, id: &str, body: &[u8]) -> Result<Content, DecodeError> {
        let mut raw: RawObject = serde_json::from_slice(body)?;
        let data: ContentData = serde_json::from_value(Value::Object(raw.clone()))?;

        AssetRewriter::new(
            &self.config.external_address,
            &self.config.bucket,
            id,
            &self.config.asset_folder,
        )
        .rewrite_docs(&mut raw);

        Ok(Content { raw, data })
    }
}

#[async_trait]
impl ContentStore for Store {
    async fn api_spec(&self, id: &str) -> Result<Option<ApiSpec>, StoreError> {
        self.fetch(id, Field::ApiSpec, |body| {
            Ok(ApiSpec {
                raw: serde_json::from_slice(body)?,
            })
        })
        .await
    }

    async fn open_api_spec(&self, id: &str) -> Result<Option<OpenApiSpec>, StoreError> {
        self.fetch(id, Field::OpenApiSpec, |body| {
            Ok(OpenApiSpec {
                raw: serde_json::from_slice(body)?,
            })
        })
        .await
    }

    async fn odata_spec(&self, id: &str) -> Result<Option<ODataSpec>, StoreError> {
        self.fetch(id, Field::ODataSpec, decode_odata).await
    }

    async fn async_api_spec(&self, id: &str) -> Result<Option<AsyncApiSpec>, StoreError> {
        self.fetch(id, Field::AsyncApiSpec, |body| {
            let raw: RawObject = serde_json::from_slice(body)?;
            let data: AsyncApiSpecData = serde_json::from_value(Value::Object(raw.clone()))?;
            Ok(AsyncApiSpec { raw, data })
        })
        .await
    }

    async fn content(&self, id: &str) -> Result<Option<Content>, StoreError> {
        self.fetch(id, Field::Content, |body| self.decode_content(id, body))
            .await
    }

    async fn notification_channel(&self, stop: StopSignal) -> mpsc::Receiver<Notification> {
        self.client
            .notification_channel(&self.config.bucket, stop)
            .await
    }
}

#[derive(Deserialize)]
struct ODataJsonHeader {
    #[serde(rename = "$Version", default)]
    version: String,
}

/// JSON CSDL first; payloads that start with markup are read as EDMX XML.
fn decode_odata(body: &[u8]) -> Result<ODataSpec, DecodeError> {
    match serde_json::from_slice::<ODataJsonHeader>(body) {
        Ok(header) if header.version.is_empty() => Ok(ODataSpec::default()),
        Ok(_) => Ok(ODataSpec {
            raw: std::str::from_utf8(body)?.to_string(),
        }),
        Err(err) if err.is_syntax() && starts_with_markup(body) => decode_odata_xml(body),
        Err(err) => Err(err.into()),
    }
}

fn starts_with_markup(body: &[u8]) -> bool {
    body.iter().find(|byte| !byte.is_ascii_whitespace()) == Some(&b'<')
}

fn decode_odata_xml(body: &[u8]) -> Result<ODataSpec, DecodeError> {
    let text = std::str::from_utf8(body)?;
    let mut reader = Reader::from_str(text);
    let mut has_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(_) | Event::Empty(_) => has_root = true,
            Event::Eof => break,
            _ => {}
        }
    }

    if !has_root {
        return Err(DecodeError::MissingRoot);
    }

    Ok(ODataSpec {
        raw: text.to_string(),
    })
}
