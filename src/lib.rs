//! Notification-driven content cache over a Minio bucket.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod storage;
