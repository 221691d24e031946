//! The persistence and notification interface the reconciler depends on.

use crate::error::StateResult;
use crate::types::{ClusterSpec, ClusterStatus, EventSeverity, StatusEvent};

/// Storage for desired cluster specs, observed statuses, and events.
///
/// A status write replaces the stored status wholesale. Implementations
/// assume a single writer per cluster id.
pub trait StatusStore: Send + Sync {
    /// Desired spec for a cluster, if one has been registered.
    fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterSpec>>;

    /// Last persisted status, or `None` before the first write.
    fn read_status(&self, cluster_id: &str) -> StateResult<Option<ClusterStatus>>;

    /// Atomically replace the persisted status.
    fn write_status(&self, cluster_id: &str, status: &ClusterStatus) -> StateResult<()>;

    /// Record an observable notification about the cluster.
    fn emit_event(
        &self,
        cluster_id: &str,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> StateResult<()>;

    /// Replace the persisted status and record `event` with it.
    ///
    /// The default writes then emits. Stores that can should override it to
    /// commit both in one transaction, so a failure leaves neither behind.
    fn write_status_with_event(
        &self,
        cluster_id: &str,
        status: &ClusterStatus,
        event: Option<&StatusEvent>,
    ) -> StateResult<()> {
        self.write_status(cluster_id, status)?;
        match event {
            Some(e) => self.emit_event(cluster_id, e.severity, &e.reason, &e.message),
            None => Ok(()),
        }
    }
}

impl<T: StatusStore + ?Sized> StatusStore for std::sync::Arc<T> {
    fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterSpec>> {
        (**self).get_cluster(cluster_id)
    }

    fn read_status(&self, cluster_id: &str) -> StateResult<Option<ClusterStatus>> {
        (**self).read_status(cluster_id)
    }

    fn write_status(&self, cluster_id: &str, status: &ClusterStatus) -> StateResult<()> {
        (**self).write_status(cluster_id, status)
    }

    fn emit_event(
        &self,
        cluster_id: &str,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> StateResult<()> {
        (**self).emit_event(cluster_id, severity, reason, message)
    }

    fn write_status_with_event(
        &self,
        cluster_id: &str,
        status: &ClusterStatus,
        event: Option<&StatusEvent>,
    ) -> StateResult<()> {
        (**self).write_status_with_event(cluster_id, status, event)
    }
}
