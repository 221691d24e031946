//! StateStore: redb-backed state persistence for Nautilus.
//!
//! Provides typed operations over cluster specs, statuses, and events.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::status_store::StatusStore;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// redb holds an exclusive file lock, so a second open of the same file
    /// while another handle or process holds it fails with
    /// `StateError::Locked`.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Locked(path.display().to_string()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(STATUSES).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(EVENT_SEQ).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Insert or update a cluster spec.
    pub fn put_cluster(&self, spec: &ClusterSpec) -> StateResult<()> {
        let value = serde_json::to_vec(spec).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(spec.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster_id = %spec.id, "cluster spec stored");
        Ok(())
    }

    /// Get a cluster spec by id.
    pub fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(cluster_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let spec: ClusterSpec =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(spec))
            }
            None => Ok(None),
        }
    }

    /// List all cluster specs, ordered by id.
    pub fn list_clusters(&self) -> StateResult<Vec<ClusterSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let spec: ClusterSpec =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(spec);
        }
        Ok(results)
    }

    /// Delete a cluster spec and its status. Returns true if the spec existed.
    pub fn delete_cluster(&self, cluster_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut clusters = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            existed = clusters.remove(cluster_id).map_err(map_err!(Write))?.is_some();
            let mut statuses = txn.open_table(STATUSES).map_err(map_err!(Table))?;
            statuses.remove(cluster_id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%cluster_id, existed, "cluster deleted");
        Ok(existed)
    }

    // ── Statuses ───────────────────────────────────────────────────

    /// Replace the stored status of a cluster in a single transaction.
    pub fn put_status(&self, cluster_id: &str, status: &ClusterStatus) -> StateResult<()> {
        self.commit_status(cluster_id, status, None).map(|_| ())
    }

    /// Replace the stored status and record `event` in the same transaction.
    ///
    /// Either both land or neither does.
    pub fn commit_status(
        &self,
        cluster_id: &str,
        status: &ClusterStatus,
        event: Option<&StatusEvent>,
    ) -> StateResult<Option<ClusterEvent>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        insert_status(&txn, cluster_id, status)?;
        let recorded = match event {
            Some(event) => Some(insert_event(&txn, cluster_id, event)?),
            None => None,
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            %cluster_id,
            ready = %status.ready,
            seq = ?recorded.as_ref().map(|e| e.seq),
            "cluster status stored"
        );
        Ok(recorded)
    }

    /// Get the stored status envelope of a cluster.
    pub fn get_stored_status(&self, cluster_id: &str) -> StateResult<Option<StoredStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUSES).map_err(map_err!(Table))?;
        let Some(guard) = table.get(cluster_id).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let stored: StoredStatus =
            serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
        if stored.version != CLUSTER_STATUS_VERSION {
            return Err(StateError::Version {
                found: stored.version,
                expected: CLUSTER_STATUS_VERSION,
            });
        }
        Ok(Some(stored))
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an event, assigning the next sequence number for the cluster.
    pub fn append_event(
        &self,
        cluster_id: &str,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> StateResult<ClusterEvent> {
        let pending = StatusEvent {
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let event = insert_event(&txn, cluster_id, &pending)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%cluster_id, seq = event.seq, ?severity, "event recorded");
        Ok(event)
    }

    /// The most recent `limit` events for a cluster, oldest first.
    pub fn list_events(&self, cluster_id: &str, limit: usize) -> StateResult<Vec<ClusterEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let range = table
            .range((cluster_id, 0u64)..=(cluster_id, u64::MAX))
            .map_err(map_err!(Read))?;

        let mut results = Vec::new();
        for entry in range.rev().take(limit) {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: ClusterEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        results.reverse();
        Ok(results)
    }
}

fn insert_status(
    txn: &WriteTransaction,
    cluster_id: &str,
    status: &ClusterStatus,
) -> StateResult<()> {
    let stored = StoredStatus {
        version: CLUSTER_STATUS_VERSION,
        status: status.clone(),
        updated_at: epoch_secs(),
    };
    let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
    let mut table = txn.open_table(STATUSES).map_err(map_err!(Table))?;
    table
        .insert(cluster_id, value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

/// Record `pending` under the cluster's next sequence number.
fn insert_event(
    txn: &WriteTransaction,
    cluster_id: &str,
    pending: &StatusEvent,
) -> StateResult<ClusterEvent> {
    let mut seqs = txn.open_table(EVENT_SEQ).map_err(map_err!(Table))?;
    let seq = seqs
        .get(cluster_id)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0)
        + 1;
    seqs.insert(cluster_id, seq).map_err(map_err!(Write))?;

    let event = ClusterEvent {
        cluster_id: cluster_id.to_string(),
        seq,
        severity: pending.severity,
        reason: pending.reason.clone(),
        message: pending.message.clone(),
        timestamp: epoch_secs(),
    };
    let value = serde_json::to_vec(&event).map_err(map_err!(Serialize))?;
    let mut events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
    events
        .insert((cluster_id, seq), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(event)
}

impl StatusStore for StateStore {
    fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterSpec>> {
        StateStore::get_cluster(self, cluster_id)
    }

    fn read_status(&self, cluster_id: &str) -> StateResult<Option<ClusterStatus>> {
        Ok(self.get_stored_status(cluster_id)?.map(|stored| stored.status))
    }

    fn write_status(&self, cluster_id: &str, status: &ClusterStatus) -> StateResult<()> {
        self.put_status(cluster_id, status)
    }

    fn emit_event(
        &self,
        cluster_id: &str,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) -> StateResult<()> {
        self.append_event(cluster_id, severity, reason, message)
            .map(|_| ())
    }

    fn write_status_with_event(
        &self,
        cluster_id: &str,
        status: &ClusterStatus,
        event: Option<&StatusEvent>,
    ) -> StateResult<()> {
        self.commit_status(cluster_id, status, event).map(|_| ())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nautilus_core::PullPolicy;

    fn test_spec(id: &str, join: &str) -> ClusterSpec {
        ClusterSpec {
            id: id.to_string(),
            join: join.to_string(),
            image: ImageSpec {
                repository: "nautilus/node".to_string(),
                tag: "latest".to_string(),
                pull_policy: PullPolicy::Always,
            },
            probe_timeout_ms: 1000,
            interval_ms: 30_000,
            deadline_ms: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn running_status(nodes: &[&str]) -> ClusterStatus {
        let nodes: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        ClusterStatus {
            phase: ClusterPhase::Running,
            node_health_status: nodes
                .iter()
                .map(|n| (n.clone(), NodeHealth::uniform(LIVE_STATUS)))
                .collect(),
            ready: ready_fraction(nodes.len(), nodes.len()),
            members: MembersStatus {
                ready: nodes.clone(),
                unready: vec![],
            },
            nodes,
        }
    }

    // ── Cluster CRUD ───────────────────────────────────────────────

    #[test]
    fn cluster_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let spec = test_spec("prod", "10.0.0.1,10.0.0.2");

        store.put_cluster(&spec).unwrap();
        assert_eq!(store.get_cluster("prod").unwrap(), Some(spec));
    }

    #[test]
    fn cluster_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_cluster("nope").unwrap().is_none());
    }

    #[test]
    fn cluster_list_is_ordered_by_id() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_cluster(&test_spec("west", "a")).unwrap();
        store.put_cluster(&test_spec("east", "b")).unwrap();

        let ids: Vec<_> = store
            .list_clusters()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["east", "west"]);
    }

    #[test]
    fn cluster_delete_removes_status() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_cluster(&test_spec("prod", "a")).unwrap();
        store.put_status("prod", &running_status(&["a"])).unwrap();

        assert!(store.delete_cluster("prod").unwrap());
        assert!(!store.delete_cluster("prod").unwrap());
        assert!(store.get_cluster("prod").unwrap().is_none());
        assert!(store.get_stored_status("prod").unwrap().is_none());
    }

    // ── Status ─────────────────────────────────────────────────────

    #[test]
    fn status_put_and_read() {
        let store = StateStore::open_in_memory().unwrap();
        let status = running_status(&["10.0.0.1", "10.0.0.2"]);

        store.put_status("prod", &status).unwrap();
        let stored = store.get_stored_status("prod").unwrap().unwrap();
        assert_eq!(stored.version, CLUSTER_STATUS_VERSION);
        assert_eq!(stored.status, status);
        assert_eq!(store.read_status("prod").unwrap(), Some(status));
    }

    #[test]
    fn status_write_replaces_whole_record() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_status("prod", &running_status(&["a", "b"])).unwrap();

        let replacement = ClusterStatus {
            nodes: vec!["a".to_string()],
            ready: ready_fraction(0, 1),
            members: MembersStatus {
                ready: vec![],
                unready: vec!["a".to_string()],
            },
            ..Default::default()
        };
        store.put_status("prod", &replacement).unwrap();

        let read = store.read_status("prod").unwrap().unwrap();
        assert_eq!(read, replacement);
        assert!(read.node_health_status.is_empty());
    }

    #[test]
    fn status_absent_before_first_write() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.read_status("prod").unwrap().is_none());
    }

    #[test]
    fn status_with_unknown_version_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let stored = StoredStatus {
            version: CLUSTER_STATUS_VERSION + 1,
            status: ClusterStatus::default(),
            updated_at: 1000,
        };
        let value = serde_json::to_vec(&stored).unwrap();
        let txn = store.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(STATUSES).unwrap();
            table.insert("prod", value.as_slice()).unwrap();
        }
        txn.commit().unwrap();

        assert!(matches!(
            store.read_status("prod"),
            Err(StateError::Version { .. })
        ));
    }

    // ── Events ─────────────────────────────────────────────────────

    #[test]
    fn events_get_increasing_sequence_per_cluster() {
        let store = StateStore::open_in_memory().unwrap();
        let first = store
            .append_event("prod", EventSeverity::Warning, "ChangedStatus", "1/2")
            .unwrap();
        let second = store
            .append_event("prod", EventSeverity::Normal, "ChangedStatus", "2/2")
            .unwrap();
        let other = store
            .append_event("edge", EventSeverity::Normal, "ChangedStatus", "1/1")
            .unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(other.seq, 1);
    }

    #[test]
    fn events_list_oldest_first_with_limit() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 1..=12 {
            store
                .append_event("prod", EventSeverity::Normal, "ChangedStatus", &format!("pass {i}"))
                .unwrap();
        }
        store
            .append_event("production", EventSeverity::Warning, "ChangedStatus", "other")
            .unwrap();

        let all = store.list_events("prod", 100).unwrap();
        assert_eq!(all.len(), 12);
        assert_eq!(all[0].message, "pass 1");
        assert_eq!(all[11].message, "pass 12");

        let recent = store.list_events("prod", 3).unwrap();
        let messages: Vec<_> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["pass 10", "pass 11", "pass 12"]);
    }

    #[test]
    fn status_store_trait_emits_events() {
        let store = StateStore::open_in_memory().unwrap();
        let sink: &dyn StatusStore = &store;
        sink.emit_event("prod", EventSeverity::Warning, "ChangedStatus", "1/3 nodes")
            .unwrap();

        let events = store.list_events("prod", 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, EventSeverity::Warning);
        assert_eq!(events[0].reason, "ChangedStatus");
    }

    #[test]
    fn events_stay_with_their_cluster_when_ids_share_a_prefix() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .append_event("prod", EventSeverity::Normal, "ChangedStatus", "prod event")
            .unwrap();
        store
            .append_event("prod:eu", EventSeverity::Warning, "ChangedStatus", "prod:eu event")
            .unwrap();
        store
            .append_event("pro", EventSeverity::Normal, "ChangedStatus", "pro event")
            .unwrap();

        let messages = |id: &str| -> Vec<String> {
            store
                .list_events(id, 10)
                .unwrap()
                .into_iter()
                .map(|e| e.message)
                .collect()
        };
        assert_eq!(messages("prod"), vec!["prod event"]);
        assert_eq!(messages("prod:eu"), vec!["prod:eu event"]);
        assert_eq!(messages("pro"), vec!["pro event"]);
    }

    #[test]
    fn commit_status_records_status_and_event_together() {
        let store = StateStore::open_in_memory().unwrap();
        let event = StatusEvent {
            severity: EventSeverity::Normal,
            reason: "ChangedStatus".to_string(),
            message: "2/2 healthy".to_string(),
        };

        let recorded = store
            .commit_status("prod", &running_status(&["a", "b"]), Some(&event))
            .unwrap()
            .unwrap();
        assert_eq!(recorded.seq, 1);
        assert_eq!(store.read_status("prod").unwrap().unwrap().ready, "2/2");

        let none = store
            .commit_status("prod", &running_status(&["a"]), None)
            .unwrap();
        assert!(none.is_none());
        assert_eq!(store.read_status("prod").unwrap().unwrap().ready, "1/1");
        assert_eq!(store.list_events("prod", 10).unwrap().len(), 1);
    }

    #[test]
    fn status_store_trait_writes_status_with_event() {
        let store = StateStore::open_in_memory().unwrap();
        let sink: &dyn StatusStore = &store;
        let event = StatusEvent {
            severity: EventSeverity::Warning,
            reason: "ChangedStatus".to_string(),
            message: "1/2 degraded".to_string(),
        };
        sink.write_status_with_event("prod", &running_status(&["a", "b"]), Some(&event))
            .unwrap();

        assert!(store.read_status("prod").unwrap().is_some());
        let events = store.list_events("prod", 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "1/2 degraded");
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nautilus.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_cluster(&test_spec("prod", "a,b")).unwrap();
            store.put_status("prod", &running_status(&["a", "b"])).unwrap();
            store
                .append_event("prod", EventSeverity::Normal, "ChangedStatus", "2/2")
                .unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get_cluster("prod").unwrap().unwrap().join, "a,b");
        assert_eq!(store.read_status("prod").unwrap().unwrap().ready, "2/2");

        // Sequence continues after reopen.
        let next = store
            .append_event("prod", EventSeverity::Warning, "ChangedStatus", "1/2")
            .unwrap();
        assert_eq!(next.seq, 2);
    }

    #[test]
    fn second_open_of_a_held_file_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nautilus.redb");
        let _held = StateStore::open(&db_path).unwrap();

        let err = StateStore::open(&db_path).err().unwrap();
        assert!(matches!(err, StateError::Locked(ref path) if path.ends_with("nautilus.redb")));
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.list_clusters().unwrap().is_empty());
        assert!(store.list_events("any", 10).unwrap().is_empty());
        assert!(!store.delete_cluster("nope").unwrap());
    }
}
