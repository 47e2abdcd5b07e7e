//! Process-scoped wiring.
//!
//! One `AppContext` is constructed at startup and passed by reference to
//! everything that needs the store, subscriptions or session — no lazy
//! global singletons.

use std::sync::Arc;
use std::time::Duration;

use fieldtrack_core::{DomainResult, SubscriptionScope};
use fieldtrack_session::{IdentityProvider, Session};

use crate::connector::SyncConnector;
use crate::live_query::LiveQueryEngine;
use crate::outbound::OutboundQueue;
use crate::store::EntityStore;
use crate::subscriptions::SubscriptionManager;
use crate::writer::JobWriter;

/// Tuning knobs for the replica.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Upper bound on `ensure` and other network-bound waits.
    pub ensure_timeout: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            ensure_timeout: Duration::from_secs(30),
        }
    }
}

/// The process-scoped object graph.
pub struct AppContext {
    store: Arc<EntityStore>,
    subscriptions: Arc<SubscriptionManager>,
    outbound: Arc<OutboundQueue>,
    session: Session,
    writer: JobWriter,
    queries: LiveQueryEngine,
}

impl AppContext {
    pub fn new(connector: Arc<dyn SyncConnector>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_config(connector, identity, ReplicaConfig::default())
    }

    pub fn with_config(
        connector: Arc<dyn SyncConnector>,
        identity: Arc<dyn IdentityProvider>,
        config: ReplicaConfig,
    ) -> Self {
        let store = Arc::new(EntityStore::new());
        let outbound = Arc::new(OutboundQueue::new());
        let session = Session::new(identity);
        let subscriptions = Arc::new(SubscriptionManager::new(
            store.clone(),
            connector,
            config.ensure_timeout,
        ));
        let writer = JobWriter::new(store.clone(), session.clone(), outbound.clone());
        let queries = LiveQueryEngine::new(store.clone(), subscriptions.clone(), session.clone());

        Self {
            store,
            subscriptions,
            outbound,
            session,
            writer,
            queries,
        }
    }

    /// Declare the standard subscription set — the full backlog, the
    /// location list and (when logged in) the current user's profile row —
    /// and wait for their initial data.
    pub async fn ensure_default_subscriptions(&self) -> DomainResult<()> {
        self.subscriptions
            .ensure("jobs", SubscriptionScope::AllJobs)
            .await?;
        self.subscriptions
            .ensure("locations", SubscriptionScope::AllLocations)
            .await?;
        if let Some(user) = self.session.current_user() {
            self.subscriptions
                .ensure("profile", SubscriptionScope::Profile(user))
                .await?;
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    pub fn outbound(&self) -> &Arc<OutboundQueue> {
        &self.outbound
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn writer(&self) -> &JobWriter {
        &self.writer
    }

    pub fn queries(&self) -> &LiveQueryEngine {
        &self.queries
    }
}
