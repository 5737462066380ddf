//! vista-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite analytics store, starts the capture pipeline and serves the ingest
//! and admin endpoints over HTTP.
//!
//! # One-off reconciliation
//!
//! ```
//! cargo run -p vista-server -- --reconcile-now
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vista_core::window::{Clock, SystemClock};
use vista_engine::{
  Pipeline, reconcile::Reconciler, recompute::Recomputer,
  shutdown::shutdown_channel,
};
use vista_server::{expand_tilde, load_config, router};
use vista_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Vista page-view analytics server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Reconcile every summary row once against the store and exit.
  #[arg(long)]
  reconcile_now: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let server_cfg = load_config(&cli.config).context("failed to load configuration")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);
  let clock: Arc<dyn Clock> = Arc::new(SystemClock);

  // Helper mode: reconcile once and exit.
  if cli.reconcile_now {
    let reconciler = Reconciler::new(
      Recomputer::new(store, clock),
      server_cfg.engine.reconcile.scope,
    );
    let (_trigger, shutdown) = shutdown_channel();
    let report = reconciler
      .run_once(&shutdown)
      .await
      .context("reconciliation failed")?;
    println!(
      "refreshed {} path(s), {} failed, in {:?}",
      report.refreshed, report.failed, report.elapsed
    );
    return Ok(());
  }

  let pipeline = Pipeline::start(store, clock, &server_cfg.engine);
  let app = router(&pipeline);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(ctrl_c())
    .await
    .context("server error")?;

  let processed = pipeline
    .shutdown()
    .await
    .context("failed to drain analytics workers")?;
  tracing::info!(processed, "shutdown complete");

  Ok(())
}

async fn ctrl_c() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown requested");
}
