pub mod config;
pub mod error;
pub mod members;

pub use config::{
    ClusterConfig, DaemonConfig, ImageConfig, NautilusConfig, ProbeConfig, PullPolicy,
    parse_duration,
};
pub use error::{ConfigError, ConfigResult};
pub use members::parse_members;
