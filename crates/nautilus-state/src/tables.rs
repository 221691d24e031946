//! redb table definitions for the Nautilus state store.

use redb::TableDefinition;

/// Desired cluster specs keyed by cluster id.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Last persisted `StoredStatus` keyed by cluster id.
pub const STATUSES: TableDefinition<&str, &[u8]> = TableDefinition::new("statuses");

/// Cluster events keyed by `(cluster_id, seq)`.
pub const EVENTS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("events");

/// Last issued event sequence per cluster id.
pub const EVENT_SEQ: TableDefinition<&str, u64> = TableDefinition::new("event_seq");
