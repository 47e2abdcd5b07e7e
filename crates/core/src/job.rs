//! Job record and its status state machine.
//!
//! The state machine is pure logic over the transition table — it holds no
//! state of its own. The replica's entity store holds the authoritative
//! current state per job and evaluates these rules under its write lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{JobId, LocationId, UserId};

/// Job lifecycle status.
///
/// `Unassigned` is initial, `Done` is terminal. Status is the lifecycle
/// signal; jobs are never deleted in normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Unassigned,
    Accepted,
    Done,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Unassigned, JobStatus::Accepted, JobStatus::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Unassigned => "unassigned",
            JobStatus::Accepted => "accepted",
            JobStatus::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transition does to the `owner` field, and who may perform it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRule {
    /// Any authenticated user may perform the transition; the acting user
    /// becomes the owner.
    AssignActor,
    /// Only the current owner may perform the transition; ownership is kept.
    RequireOwner,
    /// Only the current owner may perform the transition; ownership is
    /// cleared afterwards.
    RequireOwnerAndClear,
}

impl JobStatus {
    /// Look up `(from, to)` in the transition table.
    ///
    /// Every pair outside the table fails with
    /// [`DomainError::InvalidTransition`]; `Done` has no outgoing rows.
    pub fn transition(from: JobStatus, to: JobStatus) -> DomainResult<OwnerRule> {
        match (from, to) {
            (JobStatus::Unassigned, JobStatus::Accepted) => Ok(OwnerRule::AssignActor),
            (JobStatus::Accepted, JobStatus::Done) => Ok(OwnerRule::RequireOwner),
            (JobStatus::Accepted, JobStatus::Unassigned) => Ok(OwnerRule::RequireOwnerAndClear),
            _ => Err(DomainError::InvalidTransition { from, to }),
        }
    }
}

/// A location-tagged unit of work claimed and completed by field workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique id, immutable.
    pub id: JobId,
    pub status: JobStatus,
    /// Free-text description of the work.
    pub description: String,
    /// Creation instant, immutable.
    pub created_at: DateTime<Utc>,
    /// Location the job is tagged with, immutable.
    pub location: LocationId,
    /// User currently responsible. Non-null iff status is accepted or done.
    pub owner: Option<UserId>,
}

impl Job {
    /// Create a fresh unassigned job (the only valid initial state).
    pub fn unassigned(
        id: JobId,
        description: impl Into<String>,
        location: LocationId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Unassigned,
            description: description.into(),
            created_at,
            location,
            owner: None,
        }
    }

    /// `owner` must be set exactly when the job is accepted or done.
    pub fn owner_invariant_holds(&self) -> bool {
        match self.status {
            JobStatus::Unassigned => self.owner.is_none(),
            JobStatus::Accepted | JobStatus::Done => self.owner.is_some(),
        }
    }

    /// Validate a requested transition against the table and its actor rule,
    /// returning the `(status, owner)` pair to commit.
    ///
    /// Pure: performs no write. The store applies the returned pair under
    /// the same exclusion it used to read `self`.
    pub fn plan_transition(
        &self,
        to: JobStatus,
        actor: UserId,
    ) -> DomainResult<(JobStatus, Option<UserId>)> {
        let rule = JobStatus::transition(self.status, to)?;

        let owner = match rule {
            OwnerRule::AssignActor => Some(actor),
            OwnerRule::RequireOwner => {
                if self.owner != Some(actor) {
                    tracing::debug!(job_id = %self.id, %actor, "transition rejected: not owner");
                    return Err(DomainError::NotOwner);
                }
                self.owner
            }
            OwnerRule::RequireOwnerAndClear => {
                if self.owner != Some(actor) {
                    tracing::debug!(job_id = %self.id, %actor, "cancel rejected: not owner");
                    return Err(DomainError::NotOwner);
                }
                None
            }
        };

        Ok((to, owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_job(status: JobStatus, owner: Option<UserId>) -> Job {
        Job {
            id: JobId::new(),
            status,
            description: "Fix pump".to_string(),
            created_at: Utc::now(),
            location: LocationId::new(),
            owner,
        }
    }

    #[test]
    fn accept_assigns_the_acting_user() {
        let job = test_job(JobStatus::Unassigned, None);
        let actor = UserId::new();

        let (status, owner) = job.plan_transition(JobStatus::Accepted, actor).unwrap();
        assert_eq!(status, JobStatus::Accepted);
        assert_eq!(owner, Some(actor));
    }

    #[test]
    fn complete_requires_the_owner() {
        let owner = UserId::new();
        let job = test_job(JobStatus::Accepted, Some(owner));

        let err = job
            .plan_transition(JobStatus::Done, UserId::new())
            .unwrap_err();
        assert_eq!(err, DomainError::NotOwner);

        let (status, kept) = job.plan_transition(JobStatus::Done, owner).unwrap();
        assert_eq!(status, JobStatus::Done);
        assert_eq!(kept, Some(owner));
    }

    #[test]
    fn cancel_clears_ownership_and_is_owner_gated() {
        let owner = UserId::new();
        let job = test_job(JobStatus::Accepted, Some(owner));

        let err = job
            .plan_transition(JobStatus::Unassigned, UserId::new())
            .unwrap_err();
        assert_eq!(err, DomainError::NotOwner);

        let (status, cleared) = job.plan_transition(JobStatus::Unassigned, owner).unwrap();
        assert_eq!(status, JobStatus::Unassigned);
        assert_eq!(cleared, None);
    }

    #[test]
    fn done_is_terminal() {
        let owner = UserId::new();
        let job = test_job(JobStatus::Done, Some(owner));

        for to in JobStatus::ALL {
            let err = job.plan_transition(to, owner).unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn owner_invariant() {
        assert!(test_job(JobStatus::Unassigned, None).owner_invariant_holds());
        assert!(!test_job(JobStatus::Unassigned, Some(UserId::new())).owner_invariant_holds());
        assert!(test_job(JobStatus::Accepted, Some(UserId::new())).owner_invariant_holds());
        assert!(!test_job(JobStatus::Done, None).owner_invariant_holds());
    }

    fn status_strategy() -> impl Strategy<Value = JobStatus> {
        prop::sample::select(JobStatus::ALL.to_vec())
    }

    proptest! {
        /// The table admits exactly three rows; every other pair fails and
        /// no rule ever hands ownership to a non-actor.
        #[test]
        fn transition_table_is_complete(from in status_strategy(), to in status_strategy()) {
            let in_table = matches!(
                (from, to),
                (JobStatus::Unassigned, JobStatus::Accepted)
                    | (JobStatus::Accepted, JobStatus::Done)
                    | (JobStatus::Accepted, JobStatus::Unassigned)
            );

            match JobStatus::transition(from, to) {
                Ok(_) => prop_assert!(in_table),
                Err(DomainError::InvalidTransition { from: f, to: t }) => {
                    prop_assert!(!in_table);
                    prop_assert_eq!(f, from);
                    prop_assert_eq!(t, to);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        }

        /// A planned transition always yields a record satisfying the owner
        /// invariant.
        #[test]
        fn planned_transitions_preserve_owner_invariant(to in status_strategy()) {
            let owner = UserId::new();
            let jobs = [
                test_job(JobStatus::Unassigned, None),
                test_job(JobStatus::Accepted, Some(owner)),
                test_job(JobStatus::Done, Some(owner)),
            ];

            for job in jobs {
                if let Ok((status, new_owner)) = job.plan_transition(to, owner) {
                    let committed = Job { status, owner: new_owner, ..job };
                    prop_assert!(committed.owner_invariant_holds());
                }
            }
        }
    }
}
