//! Named subscriptions and readiness gating.
//!
//! A subscription declares which record sets the remote should replicate
//! into the local store. `ensure` resolves once the store holds the full
//! initial data set for the scope; until then, queries covered only by that
//! subscription observe an empty result (a liveness matter, never an error).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use fieldtrack_core::{DomainError, DomainResult, LocationId, SubscriptionScope, UserId};

use crate::connector::SyncConnector;
use crate::store::{EntityStore, Mutation};

/// Readiness of one named subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Declared; initial data has not fully arrived yet.
    Pending,
    /// The store holds the scope's full initial data set.
    Ready,
    /// Activation failed; the next `ensure` retries it.
    Failed,
}

#[derive(Debug)]
struct Entry {
    scope: SubscriptionScope,
    /// Bumped whenever the scope is replaced, so a stale activation cannot
    /// mark the new scope ready.
    epoch: u64,
    state: watch::Sender<ReadyState>,
}

enum Action {
    Done,
    Wait(watch::Receiver<ReadyState>),
    Activate { epoch: u64, evict_after: bool },
}

/// Declares and tracks the record sets replicated into the local store.
pub struct SubscriptionManager {
    store: Arc<EntityStore>,
    connector: Arc<dyn SyncConnector>,
    entries: Mutex<HashMap<String, Entry>>,
    /// Bumped on every readiness or scope change; live queries re-gate on it.
    generation: watch::Sender<u64>,
    ensure_timeout: Duration,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<EntityStore>,
        connector: Arc<dyn SyncConnector>,
        ensure_timeout: Duration,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            store,
            connector,
            entries: Mutex::new(HashMap::new()),
            generation,
            ensure_timeout,
        }
    }

    /// Declare a subscription and wait until its initial data is in the
    /// store.
    ///
    /// Idempotent and concurrent-safe: callers racing on the same name and
    /// scope share one activation (the store's idempotent upserts make even
    /// a duplicated batch silent). Re-ensuring with a different scope
    /// replaces the old one and evicts records no longer covered by any
    /// active scope. A timeout leaves the store unchanged and is retryable.
    pub async fn ensure(&self, name: &str, scope: SubscriptionScope) -> DomainResult<()> {
        let action = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(name) {
                Some(entry) if entry.scope == scope => {
                    let current = *entry.state.borrow();
                    match current {
                        ReadyState::Ready => Action::Done,
                        ReadyState::Pending => Action::Wait(entry.state.subscribe()),
                        ReadyState::Failed => {
                            entry.epoch += 1;
                            entry.state.send_replace(ReadyState::Pending);
                            Action::Activate {
                                epoch: entry.epoch,
                                evict_after: false,
                            }
                        }
                    }
                }
                Some(entry) => {
                    tracing::info!(
                        name,
                        old = ?entry.scope,
                        new = ?scope,
                        "replacing subscription scope"
                    );
                    entry.scope = scope;
                    entry.epoch += 1;
                    entry.state.send_replace(ReadyState::Pending);
                    Action::Activate {
                        epoch: entry.epoch,
                        evict_after: true,
                    }
                }
                None => {
                    let (state, _) = watch::channel(ReadyState::Pending);
                    entries.insert(
                        name.to_string(),
                        Entry {
                            scope,
                            epoch: 0,
                            state,
                        },
                    );
                    Action::Activate {
                        epoch: 0,
                        evict_after: false,
                    }
                }
            }
        };

        match action {
            Action::Done => Ok(()),
            Action::Wait(rx) => self.wait_ready(rx).await,
            Action::Activate { epoch, evict_after } => {
                self.bump();
                self.activate(name, scope, epoch, evict_after).await
            }
        }
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(|entry| *entry.state.borrow() == ReadyState::Ready)
    }

    pub fn scope_of(&self, name: &str) -> Option<SubscriptionScope> {
        self.entries.lock().unwrap().get(name).map(|e| e.scope)
    }

    /// Whether job queries constrained to `location` (`None` = all) are
    /// covered by a ready subscription.
    pub fn jobs_ready(&self, location: Option<LocationId>) -> bool {
        self.any_ready(|scope| scope.covers_jobs_at(location))
    }

    pub fn locations_ready(&self) -> bool {
        self.any_ready(|scope| matches!(scope, SubscriptionScope::AllLocations))
    }

    pub fn profile_ready(&self, user: UserId) -> bool {
        self.any_ready(|scope| matches!(scope, SubscriptionScope::Profile(u) if *u == user))
    }

    /// Watch channel bumped whenever any subscription's readiness or scope
    /// changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn any_ready(&self, pred: impl Fn(&SubscriptionScope) -> bool) -> bool {
        self.entries
            .lock()
            .unwrap()
            .values()
            .any(|entry| *entry.state.borrow() == ReadyState::Ready && pred(&entry.scope))
    }

    async fn activate(
        &self,
        name: &str,
        scope: SubscriptionScope,
        epoch: u64,
        evict_after: bool,
    ) -> DomainResult<()> {
        let batch = match tokio::time::timeout(
            self.ensure_timeout,
            self.connector.activate(&scope),
        )
        .await
        {
            Ok(Ok(batch)) => batch,
            Ok(Err(err)) => {
                tracing::warn!(name, %err, "subscription activation failed");
                self.finish(name, epoch, ReadyState::Failed);
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(name, "subscription activation timed out");
                self.finish(name, epoch, ReadyState::Failed);
                return Err(DomainError::Timeout);
            }
        };

        tracing::debug!(
            name,
            records = batch.record_count(),
            "applying initial subscription data"
        );

        // Idempotent upserts: a record already present and identical emits
        // no event, so a duplicated activation stays silent.
        for location in batch.locations {
            self.store.apply(Mutation::PutLocation(location))?;
        }
        for profile in batch.profiles {
            self.store.apply(Mutation::PutProfile(profile))?;
        }
        for job in batch.jobs {
            self.store.apply(Mutation::PutJob(job))?;
        }

        if evict_after {
            let scopes = self.job_scopes();
            let evicted = self.store.evict_jobs_outside(&scopes);
            if evicted > 0 {
                tracing::info!(name, evicted, "evicted records that left subscription scope");
            }
        }

        self.finish(name, epoch, ReadyState::Ready);
        Ok(())
    }

    /// Publish the final state of an activation unless a newer scope
    /// replaced it in the meantime.
    fn finish(&self, name: &str, epoch: u64, state: ReadyState) {
        {
            let entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get(name) {
                if entry.epoch == epoch {
                    entry.state.send_replace(state);
                }
            }
        }
        self.bump();
    }

    async fn wait_ready(&self, mut rx: watch::Receiver<ReadyState>) -> DomainResult<()> {
        let wait = async {
            loop {
                match *rx.borrow_and_update() {
                    ReadyState::Ready => return Ok(()),
                    // The activating caller got the real error; waiters see
                    // a retryable outcome.
                    ReadyState::Failed => return Err(DomainError::Timeout),
                    ReadyState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return Err(DomainError::Timeout);
                }
            }
        };

        match tokio::time::timeout(self.ensure_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout),
        }
    }

    fn job_scopes(&self) -> Vec<SubscriptionScope> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.scope.is_job_scope())
            .map(|entry| entry.scope)
            .collect()
    }

    fn bump(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

impl core::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let entries = self.entries.lock().unwrap();
        let mut dbg = f.debug_map();
        for (name, entry) in entries.iter() {
            dbg.entry(&name, &(*entry.state.borrow(), entry.scope));
        }
        dbg.finish()
    }
}
