//! Domain types for the Nautilus state store.
//!
//! `ClusterStatus` is the externally visible record the reconciler keeps in
//! sync with node health. It is a plain value type: equality is structural
//! and covers every nested map and list, which is what the reconciler's
//! "did anything change" gate relies on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use nautilus_core::{ClusterConfig, ConfigResult, ImageConfig, ProbeConfig, PullPolicy};

/// Unique identifier for a monitored cluster.
pub type ClusterId = String;

/// Network address of one cluster member, compared by exact string match.
pub type NodeAddress = String;

/// The only submodule status value that counts as live.
pub const LIVE_STATUS: &str = "alive";

/// Schema version written alongside every persisted status.
pub const CLUSTER_STATUS_VERSION: u32 = 1;

// ── Desired state ─────────────────────────────────────────────────

/// Desired shape of a cluster, as resolved from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    pub id: ClusterId,
    /// Comma-separated member addresses, parsed at the start of each pass.
    pub join: String,
    pub image: ImageSpec,
    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Reconciliation cadence in milliseconds.
    pub interval_ms: u64,
    /// Optional pass-level deadline in milliseconds.
    pub deadline_ms: Option<u64>,
    /// Unix timestamp (seconds) when this spec was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this spec was last updated.
    pub updated_at: u64,
}

/// Container image the cluster's nodes run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSpec {
    pub repository: String,
    pub tag: String,
    pub pull_policy: PullPolicy,
}

impl ClusterSpec {
    /// Resolve a (defaulted) cluster config into a storable spec.
    pub fn from_config(
        cluster: &ClusterConfig,
        probe: &ProbeConfig,
        now: u64,
    ) -> ConfigResult<Self> {
        let mut image = cluster.image.clone().unwrap_or_default();
        image.with_defaults();

        Ok(Self {
            id: cluster.id.clone(),
            join: cluster.join.clone(),
            image: ImageSpec::from(&image),
            probe_timeout_ms: millis(probe.timeout()?),
            interval_ms: millis(cluster.interval()?),
            deadline_ms: cluster.deadline()?.map(millis),
            created_at: now,
            updated_at: now,
        })
    }

    /// Parse the join string into the ordered member list.
    pub fn members(&self) -> ConfigResult<Vec<NodeAddress>> {
        nautilus_core::parse_members(&self.join)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

impl From<&ImageConfig> for ImageSpec {
    fn from(image: &ImageConfig) -> Self {
        Self {
            repository: image.repository.clone().unwrap_or_default(),
            tag: image.tag.clone().unwrap_or_default(),
            pull_policy: image.pull_policy.unwrap_or_default(),
        }
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Observed state ────────────────────────────────────────────────

/// Coarse cluster-wide readiness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterPhase {
    #[default]
    Initial,
    Running,
}

/// Submodule statuses reported by one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    /// Client-facing filesystem initiator.
    pub directfs_initiator: String,
    pub director: String,
    /// Key-value store.
    pub kv: String,
    /// Key-value write path.
    pub kv_write: String,
    /// Messaging bus.
    pub nats: String,
    pub presentation: String,
    /// Storage driver.
    pub rdb: String,
}

impl NodeHealth {
    /// All submodules reporting the same status (handy for fixtures).
    pub fn uniform(status: &str) -> Self {
        Self {
            directfs_initiator: status.to_string(),
            director: status.to_string(),
            kv: status.to_string(),
            kv_write: status.to_string(),
            nats: status.to_string(),
            presentation: status.to_string(),
            rdb: status.to_string(),
        }
    }

    /// Submodule name/status pairs in a fixed order.
    pub fn submodules(&self) -> [(&'static str, &str); 7] {
        [
            ("directfsInitiator", self.directfs_initiator.as_str()),
            ("director", self.director.as_str()),
            ("kv", self.kv.as_str()),
            ("kvWrite", self.kv_write.as_str()),
            ("nats", self.nats.as_str()),
            ("presentation", self.presentation.as_str()),
            ("rdb", self.rdb.as_str()),
        ]
    }
}

/// Partition of member addresses by readiness, in member list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembersStatus {
    pub ready: Vec<NodeAddress>,
    pub unready: Vec<NodeAddress>,
}

/// Externally visible health summary of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub phase: ClusterPhase,
    /// Member addresses used for the pass that produced this status.
    pub nodes: Vec<NodeAddress>,
    /// Health of every node that answered its probe.
    pub node_health_status: BTreeMap<NodeAddress, NodeHealth>,
    /// `"<ready>/<total>"`.
    pub ready: String,
    pub members: MembersStatus,
}

impl ClusterStatus {
    pub fn ready_count(&self) -> usize {
        self.members.ready.len()
    }

    pub fn total(&self) -> usize {
        self.nodes.len()
    }

    /// Every member is ready and there is at least one.
    pub fn is_fully_ready(&self) -> bool {
        self.total() > 0 && self.ready_count() == self.total()
    }
}

/// Render a ready count the way `ClusterStatus::ready` stores it.
pub fn ready_fraction(ready: usize, total: usize) -> String {
    format!("{ready}/{total}")
}

/// Versioned envelope a `ClusterStatus` is persisted in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredStatus {
    pub version: u32,
    pub status: ClusterStatus,
    /// Unix timestamp (seconds) of the write.
    pub updated_at: u64,
}

// ── Events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// A recorded notification about a cluster status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterEvent {
    pub cluster_id: ClusterId,
    /// Per-cluster sequence number, starting at 1.
    pub seq: u64,
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
    /// Unix timestamp (seconds) when the event was emitted.
    pub timestamp: u64,
}

/// A notification to record together with a status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
}
