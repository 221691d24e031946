//! Cluster monitor: one background task per cluster that runs a
//! reconciliation pass every interval.
//!
//! Passes for the same cluster never overlap: each loop awaits its pass
//! before waiting on the next tick, and missed ticks are delayed rather
//! than bunched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use nautilus_state::StatusStore;

use crate::checker::HealthProbe;
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Per-cluster monitor state.
struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorSlot {
    /// Signal and abort the loop, then wait until its task has finished.
    async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Schedules reconciliation passes for every monitored cluster.
pub struct ClusterMonitor<S, P> {
    reconciler: Arc<Reconciler<S, P>>,
    /// Active monitors: cluster_id → slot.
    monitors: Arc<RwLock<HashMap<String, MonitorSlot>>>,
}

impl<S, P> ClusterMonitor<S, P>
where
    S: StatusStore + 'static,
    P: HealthProbe,
{
    pub fn new(reconciler: Arc<Reconciler<S, P>>) -> Self {
        Self {
            reconciler,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<S, P>> {
        &self.reconciler
    }

    /// Start reconciling a cluster every `interval`, beginning immediately.
    ///
    /// A cluster that is already monitored has its loop replaced. The old
    /// loop has finished before the new one starts, so their passes never
    /// overlap.
    pub async fn start_cluster(&self, cluster_id: &str, interval: Duration) {
        let mut monitors = self.monitors.write().await;
        if let Some(old) = monitors.remove(cluster_id) {
            old.stop().await;
            debug!(%cluster_id, "previous cluster monitor stopped");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let id = cluster_id.to_string();
        let reconciler = Arc::clone(&self.reconciler);
        let handle = tokio::spawn(async move {
            run_reconcile_loop(&id, reconciler, interval, shutdown_rx).await;
        });
        monitors.insert(
            cluster_id.to_string(),
            MonitorSlot {
                handle,
                shutdown_tx,
            },
        );

        info!(%cluster_id, ?interval, "cluster monitor started");
    }

    /// Stop monitoring a cluster. Unknown ids are ignored.
    pub async fn stop_cluster(&self, cluster_id: &str) {
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(cluster_id) {
            slot.stop().await;
            info!(%cluster_id, "cluster monitor stopped");
        }
    }

    /// Stop all monitors (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (id, slot) in monitors.drain() {
            slot.stop().await;
            debug!(cluster_id = %id, "cluster monitor stopped");
        }
        info!("all cluster monitors stopped");
    }

    /// Cluster ids with an active monitor, sorted.
    pub async fn active_clusters(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        let mut ids: Vec<String> = monitors.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_monitoring(&self, cluster_id: &str) -> bool {
        self.monitors.read().await.contains_key(cluster_id)
    }
}

async fn run_reconcile_loop<S, P>(
    cluster_id: &str,
    reconciler: Arc<Reconciler<S, P>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: StatusStore,
    P: HealthProbe,
{
    // `interval` panics on a zero period.
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(%cluster_id, "reconcile loop starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reconciler.reconcile(cluster_id).await {
                    Ok(ReconcileOutcome::Unchanged) => {
                        debug!(%cluster_id, "reconciliation pass complete, no change");
                    }
                    Ok(ReconcileOutcome::Updated { notified }) => {
                        debug!(%cluster_id, ?notified, "reconciliation pass complete");
                    }
                    Err(e) => {
                        error!(%cluster_id, error = %e, "reconciliation pass failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!(%cluster_id, "reconcile loop shutting down");
                break;
            }
        }
    }
}
