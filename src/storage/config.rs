//! Storage and cache configuration.
//!
//! Built once from [`crate::config::Settings`] and never re-read at runtime.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_CAPACITY: usize = 4096;
const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 15;
const DEFAULT_ASSET_FOLDER: &str = "assets";

/// Where documents live and how asset links are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub bucket: String,
    /// Public base address of the object store, without a trailing slash.
    pub external_address: String,
    pub asset_folder: String,
}

impl StoreConfig {
    pub fn new(
        bucket: impl Into<String>,
        external_address: impl Into<String>,
        asset_folder: impl Into<String>,
    ) -> Self {
        let external_address: String = external_address.into();
        Self {
            bucket: bucket.into(),
            external_address: external_address.trim_end_matches('/').to_string(),
            asset_folder: asset_folder.into(),
        }
    }
}

impl From<&crate::config::StorageSettings> for StoreConfig {
    fn from(settings: &crate::config::StorageSettings) -> Self {
        Self::new(
            settings.bucket.clone(),
            settings.external_address.as_str(),
            settings.asset_folder.clone(),
        )
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("content", "http://127.0.0.1:9000", DEFAULT_ASSET_FOLDER)
    }
}

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of decoded entries kept in memory.
    pub capacity: usize,
    /// Pause between a dropped notification stream and the next subscription.
    pub reconnect_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            reconnect_backoff: Duration::from_secs(DEFAULT_RECONNECT_BACKOFF_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity: settings.capacity.get(),
            reconnect_backoff: settings.reconnect_backoff,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
