//! nautilusd: the Nautilus cluster health daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Per-cluster reconciliation loops (HTTP health probes)
//! - Read-only status API
//!
//! # Usage
//!
//! ```text
//! nautilusd init --cluster prod --join 10.0.0.1,10.0.0.2 --output nautilus.toml
//! nautilusd run --config nautilus.toml
//! nautilusd reconcile --config nautilus.toml --cluster prod
//! nautilusd status --data-dir /var/lib/nautilus --cluster prod
//! ```
//!
//! `reconcile` and `status` open the state database directly and fail while
//! `run` holds it; the running daemon serves the same data under `/api/v1`.

mod commands;
mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nautilus_core::config::DEFAULT_DATA_DIR;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,nautilusd=debug,nautilus_health=debug";

#[derive(Parser)]
#[command(name = "nautilusd", about = "Nautilus cluster health daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run reconciliation loops for every configured cluster and serve the
    /// status API.
    Run {
        /// Path to nautilus.toml.
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Run a single reconciliation pass and print the result. The daemon
    /// must be stopped.
    Reconcile {
        #[arg(long, short)]
        config: PathBuf,

        /// Cluster id from the config file.
        #[arg(long)]
        cluster: String,
    },

    /// Print the last reconciled status of a cluster. While the daemon runs,
    /// query its status API instead.
    Status {
        /// Data directory holding nautilus.redb.
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        #[arg(long)]
        cluster: String,

        /// Also print this many recent events.
        #[arg(long, default_value = "0")]
        events: usize,
    },

    /// Write a starter nautilus.toml for one cluster.
    Init {
        #[arg(long)]
        cluster: String,

        /// Comma-separated node addresses.
        #[arg(long, default_value = "")]
        join: String,

        /// Where to write the file; prints to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config } => daemon::run(&config).await,
        Command::Reconcile { config, cluster } => commands::reconcile_once(&config, &cluster).await,
        Command::Status {
            data_dir,
            cluster,
            events,
        } => commands::show_status(&data_dir, &cluster, events),
        Command::Init {
            cluster,
            join,
            output,
            force,
        } => commands::init(&cluster, &join, output.as_deref(), force),
    }
}

/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
