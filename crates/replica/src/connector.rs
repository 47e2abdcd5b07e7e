//! Boundary to the external replication/sync collaborator.
//!
//! The core does not implement multi-device convergence; it hands locally
//! committed mutations to a connector (fire-and-forget) and receives remote
//! state through subscription activation and direct store upserts. The
//! narrow trait keeps the remote opaque and makes it trivial to stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fieldtrack_core::{DomainResult, Job, Location, SubscriptionScope, UserProfile};

use crate::outbound::OutboundMutation;

/// Full initial data set for one subscription scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteBatch {
    pub jobs: Vec<Job>,
    pub locations: Vec<Location>,
    pub profiles: Vec<UserProfile>,
}

impl RemoteBatch {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.locations.is_empty() && self.profiles.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.jobs.len() + self.locations.len() + self.profiles.len()
    }
}

/// External sync collaborator.
#[async_trait]
pub trait SyncConnector: Send + Sync {
    /// Make the remote start replicating `scope` and return its full
    /// current data set. Network-bound; callers wrap it in a timeout.
    async fn activate(&self, scope: &SubscriptionScope) -> DomainResult<RemoteBatch>;

    /// Accept one locally committed mutation for outbound propagation.
    /// Delivery and conflict handling beyond this point belong to the
    /// remote, not to this core.
    async fn push(&self, mutation: &OutboundMutation) -> DomainResult<()>;
}
