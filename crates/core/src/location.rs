//! Location record.

use serde::{Deserialize, Serialize};

use crate::id::LocationId;

/// A place jobs are tagged with. Immutable after creation.
///
/// "All locations" is a query-layer concept (`location: None` on a filter),
/// never a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    /// Display label, effectively unique within the set.
    pub name: String,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
