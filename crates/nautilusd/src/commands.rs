//! One-shot subcommands.

use std::path::Path;

use anyhow::{Context, bail};
use tracing::info;

use nautilus_core::config::DEFAULT_LISTEN;
use nautilus_core::{NautilusConfig, parse_members};
use nautilus_health::{HttpProbe, ReconcileOutcome, Reconciler};
use nautilus_state::{StateError, StateStore, StatusStore};

use crate::daemon::{DB_FILE, epoch_secs, open_store, register_cluster};

/// Add a hint to a failed open caused by a daemon holding the database lock.
fn explain_lock(err: anyhow::Error, hint: &str) -> anyhow::Error {
    if matches!(err.downcast_ref(), Some(StateError::Locked(_))) {
        err.context(format!("state database is held by a running nautilusd; {hint}"))
    } else {
        err
    }
}

/// `nautilusd reconcile`: one pass for one configured cluster.
///
/// Writes to the state database, so the daemon must be stopped.
pub async fn reconcile_once(config_path: &Path, cluster_id: &str) -> anyhow::Result<()> {
    let config = NautilusConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let Some(cluster) = config.cluster(cluster_id) else {
        bail!("cluster {cluster_id:?} is not defined in {}", config_path.display());
    };

    let store = open_store(&config.daemon.data_dir())
        .map_err(|e| explain_lock(e, "stop it before running `nautilusd reconcile`"))?;
    register_cluster(&store, cluster, &config.probe, epoch_secs())?;

    let probe = HttpProbe::new(config.probe.port(), config.probe.path());
    let reconciler = Reconciler::new(store, probe);
    let outcome = reconciler.reconcile(cluster_id).await?;

    match outcome {
        ReconcileOutcome::Unchanged => println!("{cluster_id}: status unchanged"),
        ReconcileOutcome::Updated { notified: None } => println!("{cluster_id}: status updated"),
        ReconcileOutcome::Updated {
            notified: Some(severity),
        } => println!("{cluster_id}: status updated, {severity:?} event emitted"),
    }

    if let Some(status) = reconciler.store().read_status(cluster_id)? {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(())
}

/// `nautilusd status`: print what the last pass stored.
///
/// Reads the database directly. While the daemon runs it holds the database
/// lock, and the same data is served by its status API.
pub fn show_status(data_dir: &Path, cluster_id: &str, events: usize) -> anyhow::Result<()> {
    let db_path = data_dir.join(DB_FILE);
    if !db_path.exists() {
        bail!("no state database at {}", db_path.display());
    }
    let store = StateStore::open(&db_path).map_err(|e| {
        let hint = format!(
            "query GET /api/v1/clusters/{cluster_id}/status and /events on its listen \
             address (default {DEFAULT_LISTEN}) instead"
        );
        explain_lock(e.into(), &hint)
    })?;

    if store.get_cluster(cluster_id)?.is_none() {
        bail!("cluster {cluster_id:?} is not registered");
    }
    match store.get_stored_status(cluster_id)? {
        Some(stored) => println!("{}", serde_json::to_string_pretty(&stored)?),
        None => println!("{cluster_id}: not yet reconciled"),
    }

    if events > 0 {
        for event in store.list_events(cluster_id, events)? {
            println!(
                "{} {:?} {}: {}",
                event.timestamp, event.severity, event.reason, event.message
            );
        }
    }
    Ok(())
}

/// `nautilusd init`: scaffold a config with every default spelled out.
pub fn init(
    cluster_id: &str,
    join: &str,
    output: Option<&Path>,
    force: bool,
) -> anyhow::Result<()> {
    parse_members(join).context("invalid --join")?;

    let config = NautilusConfig::scaffold(cluster_id, join);
    let toml = config.to_toml_string()?;

    match output {
        Some(path) => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            std::fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), %cluster_id, "config written");
        }
        None => print!("{toml}"),
    }
    Ok(())
}
