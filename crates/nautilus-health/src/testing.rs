//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use nautilus_state::{LIVE_STATUS, NodeHealth};

use crate::checker::HealthProbe;
use crate::error::{ProbeError, ProbeFailure};

enum Behavior {
    Healthy(NodeHealth),
    Slow(Duration, NodeHealth),
    Failing,
}

/// In-process probe with scripted per-address answers. Unknown addresses
/// fail to connect.
#[derive(Default)]
pub(crate) struct FakeProbe {
    nodes: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeProbe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn healthy(mut self, address: &str, health: NodeHealth) -> Self {
        self.nodes
            .insert(address.to_string(), Behavior::Healthy(health));
        self
    }

    pub(crate) fn slow(mut self, address: &str, delay: Duration, health: NodeHealth) -> Self {
        self.nodes
            .insert(address.to_string(), Behavior::Slow(delay, health));
        self
    }

    pub(crate) fn failing(mut self, address: &str) -> Self {
        self.nodes.insert(address.to_string(), Behavior::Failing);
        self
    }

    pub(crate) fn calls(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

impl HealthProbe for FakeProbe {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<NodeHealth, ProbeError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default() += 1;

        match self.nodes.get(address) {
            Some(Behavior::Healthy(health)) => Ok(health.clone()),
            Some(Behavior::Slow(delay, health)) => {
                if *delay > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(ProbeError::new(address, ProbeFailure::Timeout(timeout)))
                } else {
                    tokio::time::sleep(*delay).await;
                    Ok(health.clone())
                }
            }
            Some(Behavior::Failing) | None => Err(ProbeError::new(
                address,
                ProbeFailure::Connect("connection refused".to_string()),
            )),
        }
    }
}

pub(crate) fn alive() -> NodeHealth {
    NodeHealth::uniform(LIVE_STATUS)
}

/// Every submodule alive except the storage driver.
pub(crate) fn six_of_seven() -> NodeHealth {
    NodeHealth {
        rdb: "dead".to_string(),
        ..alive()
    }
}

pub(crate) fn addrs(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}
