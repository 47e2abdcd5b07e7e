//! Outbound mutation queue.
//!
//! Locally committed writes are queued here and drained to the sync
//! connector by a background worker. The queue is in-memory: durable
//! persistence of unsynced writes is the external sync layer's concern.
//! Entries are kept in creation order so propagation preserves the order of
//! local commits.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::change::RecordRef;

/// Propagation state of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl OutboundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundStatus::Pending => "Pending",
            OutboundStatus::Syncing => "Syncing",
            OutboundStatus::Synced => "Synced",
            OutboundStatus::Failed => "Failed",
        }
    }
}

/// A locally committed mutation awaiting remote propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMutation {
    pub id: Uuid,
    /// Mutation kind, e.g. `job.transition` or `profile.save`.
    pub kind: String,
    pub record: RecordRef,
    pub payload: Value,
    pub status: OutboundStatus,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// In-memory outbound queue. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: Mutex<Vec<OutboundMutation>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new mutation for propagation.
    pub fn enqueue(&self, kind: impl Into<String>, record: RecordRef, payload: Value) -> OutboundMutation {
        let mutation = OutboundMutation {
            id: Uuid::now_v7(),
            kind: kind.into(),
            record,
            payload,
            status: OutboundStatus::Pending,
            created_at: Utc::now(),
            synced_at: None,
            error: None,
        };

        self.entries.lock().unwrap().push(mutation.clone());
        tracing::debug!(id = %mutation.id, kind = %mutation.kind, "queued outbound mutation");
        mutation
    }

    /// Mutations awaiting propagation (pending, or failed and due for
    /// retry), in creation order.
    pub fn list_pending(&self) -> Vec<OutboundMutation> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|m| matches!(m.status, OutboundStatus::Pending | OutboundStatus::Failed))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn mark_syncing(&self, id: Uuid) {
        self.update(id, |m| m.status = OutboundStatus::Syncing);
    }

    pub fn mark_synced(&self, id: Uuid) {
        self.update(id, |m| {
            m.status = OutboundStatus::Synced;
            m.synced_at = Some(Utc::now());
            m.error = None;
        });
    }

    pub fn mark_failed(&self, id: Uuid, error: impl Into<String>) {
        let error = error.into();
        self.update(id, |m| {
            m.status = OutboundStatus::Failed;
            m.error = Some(error);
        });
    }

    /// Move a failed mutation back to pending and clear its error.
    pub fn retry_failed(&self, id: Uuid) {
        self.update(id, |m| {
            if m.status == OutboundStatus::Failed {
                m.status = OutboundStatus::Pending;
                m.error = None;
            }
        });
    }

    /// Drop synced mutations older than `max_age`.
    pub fn clear_synced(&self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        self.entries.lock().unwrap().retain(|m| {
            !(m.status == OutboundStatus::Synced
                && m.synced_at.is_some_and(|at| at < cutoff))
        });
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut OutboundMutation)) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(mutation) = entries.iter_mut().find(|m| m.id == id) {
            f(mutation);
        }
    }
}
