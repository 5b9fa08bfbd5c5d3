//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod minio;
pub mod telemetry;
