//! Scheduled reconciliation of summary rows.
//!
//! Each run re-derives every summary from the fact log, healing rows left
//! stale by swallowed recompute failures and rolling window counters over
//! day, week and month boundaries. Runs are idempotent. Cancellation is only
//! observed between paths.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use vista_core::store::AnalyticsStore;

use crate::{Error, Result, recompute::Recomputer, shutdown::Shutdown};

/// Default seconds between runs.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Which paths a run refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileScope {
  /// Paths that already have a summary row.
  #[default]
  SummaryRows,
  /// Every path in the fact log, creating rows that are missing.
  LogPaths,
}

/// Outcome of a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  pub refreshed: usize,
  pub failed:    usize,
  /// Whether shutdown stopped the run before every path was visited.
  pub cancelled: bool,
  pub elapsed:   Duration,
}

/// Refreshes every path in its scope.
#[derive(Debug)]
pub struct Reconciler<S> {
  recomputer: Recomputer<S>,
  scope:      ReconcileScope,
}

impl<S> Clone for Reconciler<S> {
  fn clone(&self) -> Self {
    Self {
      recomputer: self.recomputer.clone(),
      scope:      self.scope,
    }
  }
}

impl<S: AnalyticsStore + 'static> Reconciler<S> {
  pub fn new(recomputer: Recomputer<S>, scope: ReconcileScope) -> Self {
    Self { recomputer, scope }
  }

  pub fn scope(&self) -> ReconcileScope { self.scope }

  /// Refresh every path once. Fails only if the path list cannot be read.
  pub async fn run_once(&self, shutdown: &Shutdown) -> Result<ReconcileReport> {
    let started = Instant::now();
    let store = self.recomputer.store();
    let paths = match self.scope {
      ReconcileScope::SummaryRows => store.summary_paths().await,
      ReconcileScope::LogPaths => store.distinct_paths().await,
    }
    .map_err(Error::store)?;

    tracing::info!(paths = paths.len(), scope = ?self.scope, "reconciliation started");

    let mut report = ReconcileReport::default();
    for path in &paths {
      if shutdown.is_triggered() {
        report.cancelled = true;
        break;
      }
      match self.recomputer.refresh(path).await {
        Ok(_) => report.refreshed += 1,
        Err(e) => {
          report.failed += 1;
          tracing::error!(path = %path, error = %e, "failed to reconcile path summary");
        }
      }
    }
    report.elapsed = started.elapsed();

    tracing::info!(
      refreshed = report.refreshed,
      failed = report.failed,
      cancelled = report.cancelled,
      elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
      "reconciliation finished"
    );
    Ok(report)
  }

  /// Run every `interval` until `shutdown` fires. The first run happens one
  /// interval after the call.
  pub async fn run_every(&self, interval: Duration, shutdown: Shutdown) {
    let mut ticker = tokio::time::interval_at(
      tokio::time::Instant::now() + interval,
      interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        biased;
        () = shutdown.wait() => break,
        _ = ticker.tick() => {
          if let Err(e) = self.run_once(&shutdown).await {
            tracing::error!(error = %e, "reconciliation run failed");
          }
        }
      }
    }
    tracing::debug!("reconciliation loop stopped");
  }
}
