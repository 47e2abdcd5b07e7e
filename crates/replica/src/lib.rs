//! `fieldtrack-replica` — the synchronized local replica.
//!
//! Holds the subscription-scoped copy of the shared dataset, keeps filtered
//! live views over it, and commits local writes — including the race-safe
//! job-assignment transition — so they appear instantly while remote
//! convergence happens asynchronously through the sync collaborator.

pub mod change;
pub mod connector;
pub mod context;
pub mod live_query;
pub mod outbound;
pub mod store;
pub mod subscriptions;
pub mod writer;


pub use change::{ChangeEvent, ChangeKind, RecordRef};
pub use connector::{RemoteBatch, SyncConnector};
pub use context::{AppContext, ReplicaConfig};
pub use live_query::{JobAlerts, JobFilter, JobWatch, LiveQueryEngine, LocationWatch, OwnerScope};
pub use outbound::{OutboundMutation, OutboundQueue, OutboundStatus};
pub use store::{Applied, EntityStore, Mutation};
pub use subscriptions::{ReadyState, SubscriptionManager};
pub use writer::{JobWriter, DEMO_LOCATIONS};
