//! `fieldtrack-sync` — sync collaborator implementations.
//!
//! The replica crate defines the connector boundary; this crate ships an
//! in-memory remote for dev/tests (which also models delivery of
//! remote-origin changes to attached replicas) and the background worker
//! that drains the outbound mutation queue.

pub mod in_memory;
pub mod worker;

pub use in_memory::InMemoryRemote;
pub use worker::SyncWorker;
