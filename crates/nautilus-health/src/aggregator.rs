//! Cluster aggregator. Fans probes out across members and folds the
//! results into one `ClusterStatus`.
//!
//! Every unique member address gets its own task; all tasks are joined
//! before anything is summarized, so a pass takes roughly one probe timeout
//! regardless of cluster size. Results are keyed by address and read back
//! in member list order, which keeps the output independent of the order in
//! which probes complete.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use nautilus_state::{
    ClusterPhase, ClusterSpec, ClusterStatus, LIVE_STATUS, MembersStatus, NodeAddress, NodeHealth,
    ready_fraction,
};

use crate::checker::HealthProbe;
use crate::error::{ProbeError, ProbeFailure};

/// Time bounds for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassLimits {
    /// Bound on each individual probe.
    pub probe_timeout: Duration,
    /// Bound on the whole fan-out; probes still running are abandoned.
    pub deadline: Option<Duration>,
}

impl Default for PassLimits {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            deadline: None,
        }
    }
}

impl PassLimits {
    pub fn for_spec(spec: &ClusterSpec) -> Self {
        Self {
            probe_timeout: spec.probe_timeout(),
            deadline: spec.deadline(),
        }
    }
}

type ProbeOutcome = Result<NodeHealth, ProbeError>;

/// Produces a `ClusterStatus` from concurrent node probes.
pub struct ClusterAggregator<P> {
    probe: Arc<P>,
}

impl<P: HealthProbe> ClusterAggregator<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Probe every member and summarize the results.
    pub async fn aggregate(&self, members: &[NodeAddress], limits: PassLimits) -> ClusterStatus {
        let results = self.probe_all(members, limits).await;
        summarize(members, &results)
    }

    async fn probe_all(
        &self,
        members: &[NodeAddress],
        limits: PassLimits,
    ) -> HashMap<NodeAddress, ProbeOutcome> {
        let deadline = limits.deadline.map(|d| tokio::time::Instant::now() + d);
        let timeout = limits.probe_timeout;

        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();
        for address in members {
            if !seen.insert(address.as_str()) {
                continue;
            }
            let probe = Arc::clone(&self.probe);
            let address = address.clone();
            tasks.spawn(async move {
                let probing = probe.probe(&address, timeout);
                let outcome = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, probing).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ProbeError::new(&address, ProbeFailure::Deadline)),
                    },
                    None => probing.await,
                };
                (address, outcome)
            });
        }

        let mut results = HashMap::with_capacity(seen.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, outcome)) => {
                    results.insert(address, outcome);
                }
                // The member stays unready: it has no entry in `results`.
                Err(e) => error!(error = %e, "health probe task failed"),
            }
        }
        results
    }
}

/// A node is ready only when every submodule reports exactly `"alive"`.
pub fn is_ready(health: &NodeHealth) -> bool {
    health
        .submodules()
        .iter()
        .all(|(_, status)| *status == LIVE_STATUS)
}

/// Fold per-address probe outcomes into a status, in member list order.
///
/// Members without a successful probe are unready and left out of
/// `node_health_status`.
pub fn summarize(
    members: &[NodeAddress],
    results: &HashMap<NodeAddress, ProbeOutcome>,
) -> ClusterStatus {
    let mut node_health_status = BTreeMap::new();
    let mut ready = Vec::new();
    let mut unready = Vec::new();

    for address in members {
        match results.get(address) {
            Some(Ok(health)) => {
                if is_ready(health) {
                    ready.push(address.clone());
                } else {
                    let down: Vec<&str> = health
                        .submodules()
                        .iter()
                        .filter(|(_, status)| *status != LIVE_STATUS)
                        .map(|(name, _)| *name)
                        .collect();
                    debug!(%address, ?down, "node has submodules that are not alive");
                    unready.push(address.clone());
                }
                node_health_status.insert(address.clone(), health.clone());
            }
            Some(Err(e)) => {
                warn!(%address, error = %e, "failed to get health of node");
                unready.push(address.clone());
            }
            None => {
                warn!(%address, "no probe result for node");
                unready.push(address.clone());
            }
        }
    }

    let phase = if !members.is_empty() && ready.len() == members.len() {
        ClusterPhase::Running
    } else {
        ClusterPhase::Initial
    };

    ClusterStatus {
        phase,
        nodes: members.to_vec(),
        node_health_status,
        ready: ready_fraction(ready.len(), members.len()),
        members: MembersStatus { ready, unready },
    }
}
