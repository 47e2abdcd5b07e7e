//! `fieldtrack-observability` — tracing/logging initialization.

pub mod tracing;

pub use self::tracing::init;
