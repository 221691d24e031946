//! Long-running daemon mode.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::{debug, error, info};

use nautilus_core::{ClusterConfig, NautilusConfig, ProbeConfig};
use nautilus_health::{ClusterMonitor, HttpProbe, Reconciler};
use nautilus_state::{ClusterSpec, StateStore};

/// File name of the state database inside the data directory.
pub const DB_FILE: &str = "nautilus.redb";

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    info!("Nautilus daemon starting");

    let config = NautilusConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let store = open_store(&config.daemon.data_dir())?;
    let specs = register_clusters(&store, &config, epoch_secs())?;

    // ── Reconciliation loops ───────────────────────────────────

    let probe = HttpProbe::new(config.probe.port(), config.probe.path());
    let reconciler = Arc::new(Reconciler::new(store.clone(), probe));
    let monitor = ClusterMonitor::new(reconciler);
    for spec in &specs {
        monitor.start_cluster(&spec.id, spec.interval()).await;
    }
    info!(clusters = specs.len(), "cluster monitors started");

    // ── Status API ─────────────────────────────────────────────

    let addr: SocketAddr = config
        .daemon
        .listen()
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.daemon.listen()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status API listening");

    axum::serve(listener, nautilus_api::build_router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop_all().await;
    info!("Nautilus daemon stopped");
    Ok(())
}

/// Open (creating if needed) the state database under `data_dir`.
pub fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

/// Store one cluster's desired spec, keeping the original creation time.
pub fn register_cluster(
    store: &StateStore,
    cluster: &ClusterConfig,
    probe: &ProbeConfig,
    now: u64,
) -> anyhow::Result<ClusterSpec> {
    let mut spec = ClusterSpec::from_config(cluster, probe, now)?;
    if let Some(existing) = store.get_cluster(&spec.id)? {
        spec.created_at = existing.created_at;
    }
    store.put_cluster(&spec)?;
    debug!(cluster_id = %spec.id, join = %spec.join, image = %spec.image, "cluster registered");
    Ok(spec)
}

/// Make the stored specs match the config: upsert every configured cluster
/// and drop clusters that are no longer configured.
pub fn register_clusters(
    store: &StateStore,
    config: &NautilusConfig,
    now: u64,
) -> anyhow::Result<Vec<ClusterSpec>> {
    let specs = config
        .clusters
        .iter()
        .map(|cluster| register_cluster(store, cluster, &config.probe, now))
        .collect::<anyhow::Result<Vec<_>>>()?;

    for stale in store.list_clusters()? {
        if config.cluster(&stale.id).is_none() {
            store.delete_cluster(&stale.id)?;
            info!(cluster_id = %stale.id, "cluster no longer configured, removed");
        }
    }
    Ok(specs)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
