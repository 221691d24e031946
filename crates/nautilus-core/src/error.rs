//! Configuration error types.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or interpreting cluster configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: &'static str },

    #[error("invalid member list {join:?}: {reason}")]
    InvalidMemberList { join: String, reason: String },

    #[error("duplicate cluster id: {0}")]
    DuplicateCluster(String),
}
