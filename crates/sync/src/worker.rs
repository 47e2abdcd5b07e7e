//! Background worker for periodic outbound propagation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use fieldtrack_replica::{OutboundQueue, SyncConnector};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Drains the outbound mutation queue into a connector on an interval.
///
/// Failures never reach the write path: a failed push is recorded on the
/// queue entry and retried on a later pass with exponential backoff.
pub struct SyncWorker {
    queue: Arc<OutboundQueue>,
    connector: Arc<dyn SyncConnector>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl SyncWorker {
    pub fn new(queue: Arc<OutboundQueue>, connector: Arc<dyn SyncConnector>) -> Self {
        Self {
            queue,
            connector,
            interval: DEFAULT_INTERVAL,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the background task. Runs until [`SyncWorker::shutdown`].
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let connector = self.connector.clone();
        let interval = self.interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            tracing::info!("sync worker started");

            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut consecutive_failures = 0u32;

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("sync worker received shutdown signal");
                        break;
                    }
                    _ = tick.tick() => {
                        let (synced, failed) = drain(&queue, &connector).await;

                        if failed > 0 {
                            consecutive_failures += 1;
                            let backoff = std::cmp::min(
                                Duration::from_secs(1) * (1 << consecutive_failures.min(5)),
                                BACKOFF_CAP,
                            );
                            tracing::warn!(
                                failed,
                                ?backoff,
                                "outbound propagation failed; backing off"
                            );
                            tokio::select! {
                                _ = shutdown.notified() => break,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        } else {
                            if synced > 0 {
                                tracing::debug!(synced, "outbound mutations propagated");
                            }
                            consecutive_failures = 0;
                        }
                    }
                }
            }

            tracing::info!("sync worker stopped");
        })
    }

    /// Request graceful shutdown of the worker.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// One manual pass over the pending set. Returns `(synced, failed)`.
    pub async fn drain_once(&self) -> (usize, usize) {
        drain(&self.queue, &self.connector).await
    }
}

async fn drain(queue: &OutboundQueue, connector: &Arc<dyn SyncConnector>) -> (usize, usize) {
    let pending = queue.list_pending();
    if pending.is_empty() {
        return (0, 0);
    }

    let mut synced = 0;
    let mut failed = 0;

    // Creation order; a retryable failure stops the pass so commits never
    // reach the remote out of order.
    for mutation in pending {
        queue.mark_syncing(mutation.id);
        match connector.push(&mutation).await {
            Ok(()) => {
                queue.mark_synced(mutation.id);
                synced += 1;
            }
            Err(err) if err.is_retryable() => {
                queue.mark_failed(mutation.id, err.to_string());
                failed += 1;
                break;
            }
            Err(err) => {
                tracing::error!(id = %mutation.id, kind = %mutation.kind, %err, "remote rejected mutation");
                queue.mark_failed(mutation.id, err.to_string());
                failed += 1;
            }
        }
    }

    (synced, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use fieldtrack_core::{Job, JobId, Location, LocationId};
    use fieldtrack_replica::{OutboundStatus, RecordRef};
    use serde_json::json;

    use crate::in_memory::InMemoryRemote;

    fn queued_job(queue: &OutboundQueue, remote: &InMemoryRemote) -> Job {
        let location = LocationId::new();
        remote.put_location(Location::new(location, "Dallas"));
        let job = Job::unassigned(JobId::new(), "Fix pump", location, Utc::now());
        queue.enqueue(
            "job.create",
            RecordRef::Job(job.id),
            json!({ "record": serde_json::to_value(&job).unwrap() }),
        );
        job
    }

    #[tokio::test]
    async fn drain_marks_pushed_mutations_synced() {
        let remote = InMemoryRemote::arc();
        let queue = Arc::new(OutboundQueue::new());
        let job = queued_job(&queue, &remote);

        let worker = SyncWorker::new(queue.clone(), remote.clone());
        let (synced, failed) = worker.drain_once().await;

        assert_eq!((synced, failed), (1, 0));
        assert!(queue.list_pending().is_empty());
        assert_eq!(remote.job(job.id).map(|j| j.id), Some(job.id));
    }

    #[tokio::test]
    async fn failed_push_is_kept_for_retry() {
        let remote = InMemoryRemote::arc();
        let queue = Arc::new(OutboundQueue::new());
        let job = queued_job(&queue, &remote);

        remote.set_push_failure(true);
        let worker = SyncWorker::new(queue.clone(), remote.clone());
        let (synced, failed) = worker.drain_once().await;

        assert_eq!((synced, failed), (0, 1));
        let pending = queue.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, OutboundStatus::Failed);
        assert!(remote.job(job.id).is_none());

        // Outage over: the next pass succeeds.
        remote.set_push_failure(false);
        let (synced, failed) = worker.drain_once().await;
        assert_eq!((synced, failed), (1, 0));
        assert!(queue.list_pending().is_empty());
    }

    #[tokio::test]
    async fn retryable_failure_stops_the_pass_to_preserve_order() {
        let remote = InMemoryRemote::arc();
        let queue = Arc::new(OutboundQueue::new());
        queued_job(&queue, &remote);
        queued_job(&queue, &remote);

        remote.set_push_failure(true);
        let worker = SyncWorker::new(queue.clone(), remote.clone());
        let (synced, failed) = worker.drain_once().await;

        // Only the first entry was attempted.
        assert_eq!((synced, failed), (0, 1));
        assert_eq!(remote.push_count(), 1);
    }

    #[tokio::test]
    async fn background_worker_drains_and_shuts_down() {
        let remote = InMemoryRemote::arc();
        let queue = Arc::new(OutboundQueue::new());
        queued_job(&queue, &remote);

        let worker = SyncWorker::new(queue.clone(), remote.clone())
            .with_interval(Duration::from_millis(10));
        let handle = worker.start();

        // Wait for the first pass to land.
        for _ in 0..100 {
            if queue.list_pending().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(queue.list_pending().is_empty());

        worker.shutdown();
        handle.await.unwrap();
    }
}
