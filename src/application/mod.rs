//! Application layer: lookup services and the binary's error type.

pub mod error;
pub mod services;
