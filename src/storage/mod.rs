//! Content storage: object store seam, typed store and the notification-driven cache.
//!
//! Read path: façade → [`ContentCache`] → (on miss) [`Store`] → [`ObjectClient`].
//! The cache's background loop drains bucket notifications independently of
//! request serving.

mod assets;
mod backend;
mod cache;
mod client;
mod config;
mod lock;
mod signal;
mod store;

pub use backend::{BackendError, CacheBackend, MemoryBackend};
pub use cache::{CacheError, ContentCache};
pub use client::{ObjectClient, ObjectError, ObjectReader};
pub use config::{CacheConfig, StoreConfig};
pub use signal::{StopHandle, StopSignal, stop_signal};
pub use store::{ContentStore, DecodeError, Store, StoreError};

pub(crate) mod metric_names {
    pub(crate) use super::backend::METRIC_EVICT_TOTAL;
    pub(crate) use super::cache::{
        METRIC_HIT_TOTAL, METRIC_MISS_TOTAL, METRIC_NOTIFICATION_MS, METRIC_REFRESH_TOTAL,
        METRIC_STALE_BYPASS_TOTAL, METRIC_SYNCED,
    };
}
