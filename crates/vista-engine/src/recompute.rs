//! Per-event recomputation of path summaries.
//!
//! Counters are always re-derived from the fact log, never incremented, so a
//! summary written by any task is a correct snapshot as of its `computed_at`.
//! Same-path recomputes are serialised by [`PathLocks`]; the store's upsert is
//! atomic on top of that, so a lost race to create a row merges into an
//! update.

use std::{
  collections::HashMap,
  fmt,
  sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
  },
};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use vista_core::{
  store::AnalyticsStore, summary::PathSummary, view::NewViewFact, window::Clock,
};

use crate::{Error, Result};

/// Dead lock entries are swept once the map holds this many.
const PRUNE_AT: usize = 64;

// ─── Path locks ──────────────────────────────────────────────────────────────

/// Async mutexes keyed by path. An entry lives only while a task holds or
/// waits on it.
#[derive(Debug, Default)]
pub struct PathLocks {
  locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl PathLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `path`.
  pub async fn lock(&self, path: &str) -> OwnedMutexGuard<()> {
    let mutex = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      match locks.get(path).and_then(Weak::upgrade) {
        Some(mutex) => mutex,
        None => {
          if locks.len() >= PRUNE_AT {
            locks.retain(|_, weak| weak.strong_count() > 0);
          }
          let mutex = Arc::new(AsyncMutex::new(()));
          locks.insert(path.to_owned(), Arc::downgrade(&mutex));
          mutex
        }
      }
    };
    mutex.lock_owned().await
  }

  /// Number of entries currently in the map, live or not yet swept.
  pub fn len(&self) -> usize {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RecomputeStats {
  recomputed:       AtomicU64,
  append_failed:    AtomicU64,
  recompute_failed: AtomicU64,
}

/// Point-in-time copy of recomputer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeStatsSnapshot {
  pub recomputed:       u64,
  pub append_failed:    u64,
  pub recompute_failed: u64,
}

// ─── Recomputer ──────────────────────────────────────────────────────────────

/// What happened to one fact taken off the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
  Recomputed,
  /// The fact could not be stored and was dropped.
  AppendFailed,
  /// The fact was stored but the summary was left stale.
  RecomputeFailed,
}

/// Appends facts and re-derives the affected summary rows.
pub struct Recomputer<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
  locks: Arc<PathLocks>,
  stats: Arc<RecomputeStats>,
}

impl<S> Clone for Recomputer<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      clock: Arc::clone(&self.clock),
      locks: Arc::clone(&self.locks),
      stats: Arc::clone(&self.stats),
    }
  }
}

impl<S> fmt::Debug for Recomputer<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Recomputer")
      .field("locks", &self.locks)
      .field("stats", &self.stats)
      .finish_non_exhaustive()
  }
}

impl<S: AnalyticsStore> Recomputer<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self {
      store,
      clock,
      locks: Arc::new(PathLocks::new()),
      stats: Arc::new(RecomputeStats::default()),
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn locks(&self) -> &PathLocks { &self.locks }

  /// Store `fact` and refresh its path's summary. Errors are logged and
  /// swallowed; the outcome says which step failed.
  pub async fn process(&self, fact: NewViewFact) -> ProcessOutcome {
    let path = fact.path.clone();

    if let Err(e) = self.store.append(fact).await {
      self.stats.append_failed.fetch_add(1, Ordering::Relaxed);
      tracing::error!(path = %path, error = %e, "failed to append view fact; dropping it");
      return ProcessOutcome::AppendFailed;
    }

    match self.refresh(&path).await {
      Ok(summary) => {
        self.stats.recomputed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
          path = %path,
          total_views = summary.counts.total_views,
          "recomputed path summary"
        );
        ProcessOutcome::Recomputed
      }
      Err(e) => {
        self.stats.recompute_failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(path = %path, error = %e, "failed to recompute path summary");
        ProcessOutcome::RecomputeFailed
      }
    }
  }

  /// Re-derive every counter for `path` from the fact log and persist it.
  pub async fn refresh(&self, path: &str) -> Result<PathSummary> {
    let _guard = self.locks.lock(path).await;

    let bounds = self.clock.bounds();
    let counts = self
      .store
      .tally(Some(path), &bounds)
      .await
      .map_err(Error::store)?;

    let summary = PathSummary {
      path: path.to_owned(),
      counts,
      computed_at: bounds.now,
    };
    self
      .store
      .upsert_summary(summary.clone())
      .await
      .map_err(Error::store)?;
    Ok(summary)
  }

  pub fn stats(&self) -> RecomputeStatsSnapshot {
    RecomputeStatsSnapshot {
      recomputed:       self.stats.recomputed.load(Ordering::Relaxed),
      append_failed:    self.stats.append_failed.load(Ordering::Relaxed),
      recompute_failed: self.stats.recompute_failed.load(Ordering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_path_is_exclusive() {
    let locks = Arc::new(PathLocks::new());
    let guard = locks.lock("/posts/a").await;

    let waiter = tokio::spawn({
      let locks = Arc::clone(&locks);
      async move {
        let _g = locks.lock("/posts/a").await;
      }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    // A different path is not blocked.
    drop(locks.lock("/posts/b").await);

    drop(guard);
    waiter.await.unwrap();
  }

  #[tokio::test]
  async fn released_entries_are_swept() {
    let locks = PathLocks::new();
    for i in 0..(PRUNE_AT * 3) {
      drop(locks.lock(&format!("/posts/{i}")).await);
    }
    assert!(locks.len() <= PRUNE_AT);
  }
}
