//! Subscription scope descriptors.
//!
//! A subscription declares which record sets are replicated into the local
//! store. Scopes are plain data here; the replica's subscription manager
//! owns readiness tracking and eviction.

use serde::{Deserialize, Serialize};

use crate::id::{LocationId, UserId};
use crate::job::Job;

/// Declarative description of a replicated record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionScope {
    /// Every job in the shared backlog.
    AllJobs,
    /// Jobs tagged with a single location (a narrowed job scope).
    JobsInLocation(LocationId),
    /// The full location list.
    AllLocations,
    /// One user's profile row.
    Profile(UserId),
}

impl SubscriptionScope {
    pub fn is_job_scope(&self) -> bool {
        matches!(self, Self::AllJobs | Self::JobsInLocation(_))
    }

    /// Whether a job record falls inside this scope.
    pub fn covers_job(&self, job: &Job) -> bool {
        match self {
            Self::AllJobs => true,
            Self::JobsInLocation(location) => job.location == *location,
            Self::AllLocations | Self::Profile(_) => false,
        }
    }

    /// Whether job queries constrained to `location` (or unconstrained, for
    /// `None`) are a subset of this scope.
    pub fn covers_jobs_at(&self, location: Option<LocationId>) -> bool {
        match self {
            Self::AllJobs => true,
            Self::JobsInLocation(scoped) => location == Some(*scoped),
            Self::AllLocations | Self::Profile(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::JobId;
    use chrono::Utc;

    #[test]
    fn job_scopes_cover_by_location() {
        let dallas = LocationId::new();
        let miami = LocationId::new();
        let job = Job::unassigned(JobId::new(), "Fix pump", dallas, Utc::now());

        assert!(SubscriptionScope::AllJobs.covers_job(&job));
        assert!(SubscriptionScope::JobsInLocation(dallas).covers_job(&job));
        assert!(!SubscriptionScope::JobsInLocation(miami).covers_job(&job));
        assert!(!SubscriptionScope::AllLocations.covers_job(&job));
    }

    #[test]
    fn narrowed_scope_only_covers_matching_queries() {
        let dallas = LocationId::new();

        assert!(SubscriptionScope::AllJobs.covers_jobs_at(None));
        assert!(SubscriptionScope::AllJobs.covers_jobs_at(Some(dallas)));
        assert!(SubscriptionScope::JobsInLocation(dallas).covers_jobs_at(Some(dallas)));
        assert!(!SubscriptionScope::JobsInLocation(dallas).covers_jobs_at(None));
        assert!(!SubscriptionScope::JobsInLocation(dallas).covers_jobs_at(Some(LocationId::new())));
    }
}
