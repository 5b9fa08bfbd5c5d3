//! Physical byte cache behind [`super::ContentCache`].
//!
//! Implementations must be safe to share across tasks; the cache adds no locking
//! of its own.

use std::sync::RwLock;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "storage::backend";
pub(crate) const METRIC_EVICT_TOTAL: &str = "content_cache_evict_total";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("entry `{key}` not found")]
    NotFound { key: String },
    #[error("cache backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Bytes, BackendError>;
    fn set(&self, key: &str, value: Bytes) -> Result<(), BackendError>;
    /// Deleting an absent key reports [`BackendError::NotFound`].
    fn delete(&self, key: &str) -> Result<(), BackendError>;
    fn reset(&self) -> Result<(), BackendError>;
}

/// In-process backend. Entries never expire; LRU eviction only bounds memory.
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Get the number of cached entries.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    /// Check if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Bytes, BackendError> {
        // `get` refreshes recency, so it needs the write side.
        rw_write(&self.entries, SOURCE, "get")
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::not_found(key))
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), BackendError> {
        let displaced = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), value);
        if let Some((displaced_key, _)) = displaced
            && displaced_key != key
        {
            counter!(METRIC_EVICT_TOTAL).increment(1);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        rw_write(&self.entries, SOURCE, "delete")
            .pop(key)
            .map(|_| ())
            .ok_or_else(|| BackendError::not_found(key))
    }

    fn reset(&self) -> Result<(), BackendError> {
        rw_write(&self.entries, SOURCE, "reset").clear();
        Ok(())
    }
}
