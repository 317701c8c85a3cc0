//! Client-side cluster syncer - periodic membership and routing refresh

use super::membership::NodesConfig;
use super::types::{ClusterError, ClusterResult, SyncReport};
use crate::sharding::{SharedAlgorithm, sync_shards};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors buffered for a slow consumer before new ones are dropped
pub const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Keeps a client's membership and shard table in step with the cluster
pub struct ClusterSyncer {
    membership: Arc<NodesConfig>,
    shards: SharedAlgorithm,
    sync_interval: Duration,
}

impl ClusterSyncer {
    pub fn new(membership: Arc<NodesConfig>, shards: SharedAlgorithm, sync_interval: Duration) -> Self {
        Self {
            membership,
            shards,
            sync_interval,
        }
    }

    /// One pass: sync membership, then the shard table if anything changed.
    ///
    /// The two steps are not atomic; requests in between may be routed on
    /// the old table.
    pub async fn sync_once(&self) -> ClusterResult<SyncReport> {
        let report = self.membership.sync().await?;

        if report.changed {
            let desired = self.membership.get_shards();
            let shard_report = {
                let mut table = self.shards.write();
                sync_shards(table.as_mut(), &desired)
            };
            info!(
                "Shard table synced: +{} -{}",
                shard_report.added, shard_report.removed
            );
        } else {
            debug!("Cluster membership unchanged");
        }

        Ok(report)
    }

    /// Spawn the sync loop.
    ///
    /// Sync errors are delivered on the returned channel, which closes when
    /// the loop exits after `token` is cancelled.
    pub fn start(self, token: CancellationToken) -> (JoinHandle<()>, mpsc::Receiver<ClusterError>) {
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(self.sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Cluster syncer stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = self.sync_once().await;
                        crate::metrics::record_membership_sync(&outcome);

                        let error = match outcome {
                            Ok(report) => report.error(),
                            Err(e) => Some(e),
                        };
                        if let Some(e) = error {
                            warn!("Cluster sync failed: {}", e);
                            if error_tx.try_send(e).is_err() {
                                debug!("Sync error channel full, dropping error");
                            }
                        }
                    }
                }
            }
        });

        (handle, error_rx)
    }
}
