//! nautilus-state: persisted desired and observed state for Nautilus clusters.
//!
//! Backed by [redb](https://docs.rs/redb), holds the desired `ClusterSpec`
//! per cluster, the last reconciled `ClusterStatus`, and the event log that
//! records status transitions.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Specs and statuses are keyed by cluster id; events are keyed by the
//! `(cluster_id, seq)` tuple, so a range over one cluster id yields its events
//! in emission order and never touches another cluster's.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements [`StatusStore`], the interface the reconciler depends on.

pub mod error;
pub mod status_store;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use status_store::StatusStore;
pub use store::StateStore;
pub use types::*;
