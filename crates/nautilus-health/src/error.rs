//! Health reconciliation error types.

use std::time::Duration;

use nautilus_core::ConfigError;
use nautilus_state::StateError;
use thiserror::Error;

/// A single node's probe failed. Recovered by the aggregator: the node is
/// marked unready and the pass continues.
#[derive(Debug, Error)]
#[error("health probe of {address} failed: {failure}")]
pub struct ProbeError {
    pub address: String,
    pub failure: ProbeFailure,
}

impl ProbeError {
    pub fn new(address: &str, failure: ProbeFailure) -> Self {
        Self {
            address: address.to_string(),
            failure,
        }
    }
}

/// Underlying cause of a failed probe.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("node address is empty")]
    EmptyAddress,

    #[error("probe timeout must be positive")]
    InvalidTimeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("abandoned at pass deadline")]
    Deadline,

    #[error("http error: {0}")]
    Http(String),

    #[error("undecodable health document: {0}")]
    Decode(String),
}

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StateError),
}

pub type HealthResult<T> = Result<T, HealthError>;
