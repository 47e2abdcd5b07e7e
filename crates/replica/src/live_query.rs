//! Live filtered views over the replica.
//!
//! A `watch` registration materializes the current matching set immediately
//! and republishes the full ordered sequence (never a diff) whenever a
//! relevant store change or a subscription readiness flip alters the
//! result. Each registration runs on its own task with an ordered channel,
//! so a consumer never observes out-of-order emissions; registrations share
//! nothing and recompute from the store directly.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use fieldtrack_core::{Job, JobId, JobStatus, Location, LocationId, UserId};
use fieldtrack_session::Session;

use crate::change::ChangeKind;
use crate::store::EntityStore;
use crate::subscriptions::SubscriptionManager;

/// Whose jobs a view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerScope {
    /// Jobs regardless of owner (the shared backlog view).
    #[default]
    Any,
    /// Only jobs owned by the current user ("my jobs").
    Mine,
}

/// Filter for a live job view. All specified predicates must match
/// (conjunction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub status: JobStatus,
    /// `None` means no location constraint ("all locations").
    pub location: Option<LocationId>,
    /// Case-sensitive substring of the description.
    pub keyword: Option<String>,
    pub owner: OwnerScope,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status,
            location: None,
            keyword: None,
            owner: OwnerScope::Any,
        }
    }

    pub fn at_location(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn mine(mut self) -> Self {
        self.owner = OwnerScope::Mine;
        self
    }

    /// Whether `job` matches, as seen by `viewer` (needed for
    /// [`OwnerScope::Mine`]).
    pub fn matches(&self, job: &Job, viewer: Option<UserId>) -> bool {
        if job.status != self.status {
            return false;
        }
        if let Some(location) = self.location {
            if job.location != location {
                return false;
            }
        }
        if let Some(keyword) = &self.keyword {
            if !job.description.contains(keyword.as_str()) {
                return false;
            }
        }
        match self.owner {
            OwnerScope::Any => true,
            OwnerScope::Mine => viewer.is_some() && job.owner == viewer,
        }
    }
}

/// Emissions buffered per registration; the producing task suspends when a
/// slow consumer falls this far behind, preserving order.
const WATCH_BUFFER: usize = 16;

/// A live job view. Dropping it (or calling [`JobWatch::cancel`]) stops
/// emissions and releases the registration's task.
#[derive(Debug)]
pub struct JobWatch {
    rx: mpsc::Receiver<Vec<Job>>,
    task: JoinHandle<()>,
}

impl JobWatch {
    /// Next full result sequence. `None` once the registration is closed.
    pub async fn next(&mut self) -> Option<Vec<Job>> {
        self.rx.recv().await
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A live ordered location list.
#[derive(Debug)]
pub struct LocationWatch {
    rx: mpsc::Receiver<Vec<Location>>,
    task: JoinHandle<()>,
}

impl LocationWatch {
    pub async fn next(&mut self) -> Option<Vec<Location>> {
        self.rx.recv().await
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Stream of ids of newly arrived unassigned jobs (the "new job available"
/// signal; how a device surfaces it to the worker is not this core's
/// concern).
#[derive(Debug)]
pub struct JobAlerts {
    rx: mpsc::Receiver<JobId>,
    task: JoinHandle<()>,
}

impl JobAlerts {
    pub async fn next(&mut self) -> Option<JobId> {
        self.rx.recv().await
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for JobAlerts {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Registers live views over the store. Requires a tokio runtime.
#[derive(Clone)]
pub struct LiveQueryEngine {
    store: Arc<EntityStore>,
    subscriptions: Arc<SubscriptionManager>,
    session: Session,
}

impl LiveQueryEngine {
    pub fn new(
        store: Arc<EntityStore>,
        subscriptions: Arc<SubscriptionManager>,
        session: Session,
    ) -> Self {
        Self {
            store,
            subscriptions,
            session,
        }
    }

    /// Register a live filtered job view.
    ///
    /// The first emission is the current matching set — empty when the
    /// covering subscription is not ready yet, followed by the full set once
    /// readiness arrives. Emissions repeat the whole ordered sequence and
    /// are deduplicated: a store change that does not alter this view's
    /// result produces nothing.
    pub fn watch(&self, filter: JobFilter) -> JobWatch {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let store = self.store.clone();
        let subscriptions = self.subscriptions.clone();
        let session = self.session.clone();

        let task = tokio::spawn(async move {
            // Subscribe before the initial read so no change is missed
            // between snapshot and loop.
            let mut changes = store.subscribe_changes();
            let mut readiness = subscriptions.changes();
            readiness.mark_unchanged();

            let compute = |store: &EntityStore| -> Vec<Job> {
                if !subscriptions.jobs_ready(filter.location) {
                    return Vec::new();
                }
                let viewer = session.current_user();
                store.jobs_matching(|job| filter.matches(job, viewer))
            };

            let mut last = compute(&store);
            if tx.send(last.clone()).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    event = changes.recv() => match event {
                        Ok(event) => {
                            if !event.concerns_jobs() {
                                continue;
                            }
                        }
                        // Lagged: resynchronize from the store below.
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "live view lagged; resynchronizing");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = readiness.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let next = compute(&store);
                if next != last {
                    if tx.send(next.clone()).await.is_err() {
                        break;
                    }
                    last = next;
                }
            }
        });

        JobWatch { rx, task }
    }

    /// Register a live view of the full location list, in insertion order.
    pub fn watch_locations(&self) -> LocationWatch {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let store = self.store.clone();
        let subscriptions = self.subscriptions.clone();

        let task = tokio::spawn(async move {
            let mut changes = store.subscribe_changes();
            let mut readiness = subscriptions.changes();
            readiness.mark_unchanged();

            let compute = |store: &EntityStore| -> Vec<Location> {
                if !subscriptions.locations_ready() {
                    return Vec::new();
                }
                store.locations()
            };

            let mut last = compute(&store);
            if tx.send(last.clone()).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    event = changes.recv() => match event {
                        Ok(event) => {
                            if !event.concerns_locations() {
                                continue;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = readiness.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let next = compute(&store);
                if next != last {
                    if tx.send(next.clone()).await.is_err() {
                        break;
                    }
                    last = next;
                }
            }
        });

        LocationWatch { rx, task }
    }

    /// Signal newly inserted unassigned jobs, one id per arrival.
    pub fn new_job_alerts(&self) -> JobAlerts {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            let mut changes = store.subscribe_changes();

            loop {
                let event = match changes.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if event.kind != ChangeKind::Insert {
                    continue;
                }
                let Some(job_id) = event.job_id() else {
                    continue;
                };
                let is_new_work = store
                    .get_job(job_id)
                    .is_some_and(|job| job.status == JobStatus::Unassigned);

                if is_new_work && tx.send(job_id).await.is_err() {
                    break;
                }
            }
        });

        JobAlerts { rx, task }
    }
}
