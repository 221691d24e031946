//! nautilus.toml configuration parser.
//!
//! Every optional field is filled in by `with_defaults`, which reports
//! whether anything changed so callers can decide to write the file back.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::members::parse_members;

pub const DEFAULT_DATA_DIR: &str = "/var/lib/nautilus";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8480";
pub const DEFAULT_HEALTH_PORT: u16 = 5705;
pub const DEFAULT_HEALTH_PATH: &str = "/v1/health";
pub const DEFAULT_PROBE_TIMEOUT: &str = "1s";
pub const DEFAULT_RECONCILE_INTERVAL: &str = "30s";
pub const DEFAULT_IMAGE_REPOSITORY: &str = "nautilus/node";
pub const DEFAULT_IMAGE_TAG: &str = "latest";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NautilusConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub data_dir: Option<PathBuf>,
    pub listen: Option<String>,
}

/// How the health endpoint on each node is reached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub port: Option<u16>,
    pub path: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    /// Comma-separated node addresses.
    pub join: String,
    pub interval: Option<String>,
    /// Optional deadline for a whole reconciliation pass.
    pub deadline: Option<String>,
    pub image: Option<ImageConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub pull_policy: Option<PullPolicy>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPolicy {
    #[default]
    Always,
    IfNotPresent,
    Never,
}

impl NautilusConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read a config file, fill in defaults, and check it can be run.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = Self::from_file(path)?;
        config.with_defaults();
        config.check()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn with_defaults(&mut self) -> bool {
        let mut changed = self.daemon.with_defaults();
        changed |= self.probe.with_defaults();
        for cluster in &mut self.clusters {
            changed |= cluster.with_defaults();
        }
        changed
    }

    /// Reject configs whose durations or member lists cannot be used.
    pub fn check(&self) -> ConfigResult<()> {
        self.probe.timeout()?;
        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if !seen.insert(cluster.id.as_str()) {
                return Err(ConfigError::DuplicateCluster(cluster.id.clone()));
            }
            cluster.members()?;
            cluster.interval()?;
            cluster.deadline()?;
        }
        Ok(())
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Scaffold a minimal nautilus.toml for a single cluster.
    pub fn scaffold(cluster_id: &str, join: &str) -> Self {
        let mut config = NautilusConfig {
            clusters: vec![ClusterConfig {
                id: cluster_id.to_string(),
                join: join.to_string(),
                interval: None,
                deadline: None,
                image: None,
            }],
            ..Default::default()
        };
        config.with_defaults();
        config
    }
}

impl DaemonConfig {
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.data_dir.is_none() {
            changed = true;
            self.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
        }
        if self.listen.is_none() {
            changed = true;
            self.listen = Some(DEFAULT_LISTEN.to_string());
        }
        changed
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn listen(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }
}

impl ProbeConfig {
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.port.is_none() {
            changed = true;
            self.port = Some(DEFAULT_HEALTH_PORT);
        }
        if self.path.is_none() {
            changed = true;
            self.path = Some(DEFAULT_HEALTH_PATH.to_string());
        }
        if self.timeout.is_none() {
            changed = true;
            self.timeout = Some(DEFAULT_PROBE_TIMEOUT.to_string());
        }
        changed
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_HEALTH_PORT)
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH)
    }

    pub fn timeout(&self) -> ConfigResult<Duration> {
        parse_duration(self.timeout.as_deref().unwrap_or(DEFAULT_PROBE_TIMEOUT))
    }
}

impl ClusterConfig {
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.interval.is_none() {
            changed = true;
            self.interval = Some(DEFAULT_RECONCILE_INTERVAL.to_string());
        }
        if self.image.is_none() {
            changed = true;
            self.image = Some(ImageConfig::default());
        }
        if let Some(image) = self.image.as_mut() {
            changed |= image.with_defaults();
        }
        changed
    }

    pub fn members(&self) -> ConfigResult<Vec<String>> {
        parse_members(&self.join)
    }

    pub fn interval(&self) -> ConfigResult<Duration> {
        parse_duration(self.interval.as_deref().unwrap_or(DEFAULT_RECONCILE_INTERVAL))
    }

    pub fn deadline(&self) -> ConfigResult<Option<Duration>> {
        self.deadline.as_deref().map(parse_duration).transpose()
    }
}

impl ImageConfig {
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.repository.as_deref().is_none_or(str::is_empty) {
            changed = true;
            self.repository = Some(DEFAULT_IMAGE_REPOSITORY.to_string());
        }
        if self.tag.as_deref().is_none_or(str::is_empty) {
            changed = true;
            self.tag = Some(DEFAULT_IMAGE_TAG.to_string());
        }
        if self.pull_policy.is_none() {
            changed = true;
            self.pull_policy = Some(PullPolicy::default());
        }
        changed
    }
}

/// Formats as a Docker compatible `repository:tag` reference.
impl fmt::Display for ImageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.repository.as_deref().unwrap_or(DEFAULT_IMAGE_REPOSITORY),
            self.tag.as_deref().unwrap_or(DEFAULT_IMAGE_TAG)
        )
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of
/// seconds. Zero is rejected.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = |reason| ConfigError::InvalidDuration {
        value: s.to_string(),
        reason,
    };

    let number = |n: &str| {
        n.parse::<u64>()
            .map_err(|_| invalid("expected <n>ms, <n>s, <n>m or <n>"))
    };

    let duration = if let Some(ms) = s.strip_suffix("ms") {
        Duration::from_millis(number(ms)?)
    } else if let Some(secs) = s.strip_suffix('s') {
        Duration::from_secs(number(secs)?)
    } else if let Some(mins) = s.strip_suffix('m') {
        let secs = number(mins)?
            .checked_mul(60)
            .ok_or_else(|| invalid("too large"))?;
        Duration::from_secs(secs)
    } else {
        Duration::from_secs(number(s)?)
    };

    if duration.is_zero() {
        return Err(invalid("must be positive"));
    }
    Ok(duration)
}
