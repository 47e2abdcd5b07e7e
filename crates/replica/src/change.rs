//! Change events emitted by the entity store.
//!
//! Every successful mutation publishes exactly one event per affected record,
//! after the mutation is visible to reads. Consumers (live query
//! registrations, alert streams) recompute from the store rather than from
//! event payloads, so delivery is broadcast, best-effort and loss-tolerant:
//! a lagged consumer resynchronizes by re-reading.

use serde::{Deserialize, Serialize};

use fieldtrack_core::{JobId, LocationId, UserId};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    /// Remote-origin removal delivered by the sync layer.
    Delete,
    /// Local removal because the record left every active subscription
    /// scope. Distinct from `Delete`: the record still exists remotely.
    Evict,
}

/// Typed reference to the affected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordRef {
    Job(JobId),
    Location(LocationId),
    Profile(UserId),
}

/// A single store change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: RecordRef,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record: RecordRef) -> Self {
        Self { kind, record }
    }

    pub fn concerns_jobs(&self) -> bool {
        matches!(self.record, RecordRef::Job(_))
    }

    pub fn concerns_locations(&self) -> bool {
        matches!(self.record, RecordRef::Location(_))
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self.record {
            RecordRef::Job(id) => Some(id),
            _ => None,
        }
    }
}
