//! nautilus-health: health reconciliation for Nautilus clusters.
//!
//! Probes every member node's health endpoint, folds the seven-submodule
//! reports into a `ClusterStatus`, and keeps the persisted status in step
//! with it, emitting an event whenever the ready-node count moves.
//!
//! # Architecture
//!
//! ```text
//! ClusterMonitor
//!   └── Per-cluster background task (one pass in flight at a time)
//!       └── Reconciler::reconcile(cluster_id)
//!           ├── StatusStore::get_cluster → member list
//!           ├── ClusterAggregator::aggregate
//!           │   └── one task per node: HealthProbe::probe (bounded timeout)
//!           └── apply_status
//!               ├── unchanged → no-op
//!               └── changed → write_status_with_event (one commit; the
//!                   event only on a ready-count change)
//! ```
//!
//! A node that cannot be probed is unready and absent from the health map.
//! Probe failures never abort a pass; store failures always do.

pub mod aggregator;
pub mod checker;
pub mod error;
pub mod monitor;
pub mod reconciler;

#[cfg(test)]
mod testing;

pub use aggregator::{ClusterAggregator, PassLimits, is_ready, summarize};
pub use checker::{HealthDocument, HealthProbe, HttpProbe, MAX_HEALTH_BODY};
pub use error::{HealthError, HealthResult, ProbeError, ProbeFailure};
pub use monitor::ClusterMonitor;
pub use reconciler::{CHANGED_STATUS_REASON, ReconcileOutcome, Reconciler, apply_status};
