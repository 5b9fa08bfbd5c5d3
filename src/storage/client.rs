//! Object store seam consumed by the store.

use std::{error::Error as StdError, fmt, future::Future};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::Notification;

use super::signal::StopSignal;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object `{bucket}/{key}` does not exist")]
    NotFound { bucket: String, key: String },
    #[error("object store returned {status} for `{bucket}/{key}`: {message}")]
    Status {
        bucket: String,
        key: String,
        status: u16,
        message: String,
    },
    #[error("object store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid object store request: {message}")]
    Request { message: String },
}

impl ObjectError {
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectError::NotFound { .. })
    }
}

/// Body of a stored object. Reading is deferred, so absence may only show up in
/// [`ObjectReader::read_all`].
pub struct ObjectReader {
    body: BoxFuture<'static, Result<Bytes, ObjectError>>,
}

impl ObjectReader {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::deferred(async move { Ok(bytes) })
    }

    pub fn failed(error: ObjectError) -> Self {
        Self::deferred(async move { Err(error) })
    }

    pub fn deferred<F>(body: F) -> Self
    where
        F: Future<Output = Result<Bytes, ObjectError>> + Send + 'static,
    {
        Self {
            body: Box::pin(body),
        }
    }

    pub async fn read_all(self) -> Result<Bytes, ObjectError> {
        self.body.await
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn object(&self, bucket: &str, key: &str) -> Result<ObjectReader, ObjectError>;

    /// Subscribe to created/removed events in `bucket`. The channel closes once
    /// `stop` fires or the subscription ends.
    async fn notification_channel(
        &self,
        bucket: &str,
        stop: StopSignal,
    ) -> mpsc::Receiver<Notification>;

    /// Whether `error`, raised while reading or decoding an object, means the
    /// object is absent.
    fn is_not_exists_error(&self, error: &(dyn StdError + 'static)) -> bool;
}
