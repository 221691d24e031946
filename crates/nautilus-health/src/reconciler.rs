//! Status reconciler: keeps the persisted `ClusterStatus` in step with the
//! aggregated one and emits an event when the ready count moves.

use tracing::{debug, info, warn};

use nautilus_state::{ClusterStatus, EventSeverity, StatusEvent, StatusStore, ready_fraction};

use crate::aggregator::{ClusterAggregator, PassLimits};
use crate::checker::HealthProbe;
use crate::error::{HealthError, HealthResult};

/// Reason attached to every status transition event.
pub const CHANGED_STATUS_REASON: &str = "ChangedStatus";

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The aggregated status equals the stored one; nothing was written.
    Unchanged,
    /// The status was written. `notified` carries the severity of the event
    /// recorded with it, if the ready count changed.
    Updated { notified: Option<EventSeverity> },
}

/// Event for a transition from `previous` to `next`, if the ready count moved.
///
/// A missing previous status reads as `"0/0"`.
fn transition_event(previous: Option<&ClusterStatus>, next: &ClusterStatus) -> Option<StatusEvent> {
    let empty = ready_fraction(0, 0);
    let previous_ready = previous.map_or(empty.as_str(), |s| s.ready.as_str());
    if previous_ready == next.ready {
        return None;
    }

    let (severity, message) = if next.is_fully_ready() {
        (
            EventSeverity::Normal,
            format!("{} Nautilus nodes are functional. Cluster healthy", next.ready),
        )
    } else {
        (EventSeverity::Warning, format!("{} Nautilus nodes are functional", next.ready))
    };
    Some(StatusEvent {
        severity,
        reason: CHANGED_STATUS_REASON.to_string(),
        message,
    })
}

/// Persist `next` if it differs from the stored status, with the transition
/// event if the ready count moved.
///
/// The status and its event are written together. If that write fails the
/// pass aborts with `HealthError::Persistence` and neither is kept, so the
/// next pass sees the old status and retries both.
pub fn apply_status<S: StatusStore + ?Sized>(
    store: &S,
    cluster_id: &str,
    next: &ClusterStatus,
) -> HealthResult<ReconcileOutcome> {
    let previous = store.read_status(cluster_id)?;
    if previous.as_ref() == Some(next) {
        debug!(%cluster_id, ready = %next.ready, "cluster status unchanged");
        return Ok(ReconcileOutcome::Unchanged);
    }

    let event = transition_event(previous.as_ref(), next);
    store.write_status_with_event(cluster_id, next, event.as_ref())?;
    info!(
        %cluster_id,
        ready = %next.ready,
        phase = ?next.phase,
        "cluster status updated"
    );

    let Some(event) = event else {
        return Ok(ReconcileOutcome::Updated { notified: None });
    };
    match event.severity {
        EventSeverity::Normal => info!(%cluster_id, message = %event.message, "cluster healthy"),
        EventSeverity::Warning => warn!(%cluster_id, message = %event.message, "cluster degraded"),
    }
    Ok(ReconcileOutcome::Updated {
        notified: Some(event.severity),
    })
}

/// Runs reconciliation passes for clusters registered in a store.
pub struct Reconciler<S, P> {
    store: S,
    aggregator: ClusterAggregator<P>,
}

impl<S: StatusStore, P: HealthProbe> Reconciler<S, P> {
    pub fn new(store: S, probe: P) -> Self {
        Self {
            store,
            aggregator: ClusterAggregator::new(probe),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn aggregator(&self) -> &ClusterAggregator<P> {
        &self.aggregator
    }

    /// One pass: load the spec, probe its members, apply the result.
    pub async fn reconcile(&self, cluster_id: &str) -> HealthResult<ReconcileOutcome> {
        let spec = self
            .store
            .get_cluster(cluster_id)?
            .ok_or_else(|| HealthError::ClusterNotFound(cluster_id.to_string()))?;
        let members = spec.members()?;

        debug!(%cluster_id, members = members.len(), "reconciliation pass starting");
        let status = self
            .aggregator
            .aggregate(&members, PassLimits::for_spec(&spec))
            .await;

        apply_status(&self.store, cluster_id, &status)
    }
}
