//! Bounded hand-off of view facts from request tasks to background workers.
//!
//! Sending never waits on storage. When the queue is full the configured
//! [`OverflowPolicy`] decides between dropping the incoming fact at once and
//! waiting a bounded time for capacity. Every outcome is counted so drop
//! rates can be monitored.
//!
//! Delivery is at-least-once for the life of the process: facts still queued
//! when the process dies are lost, and the reconciler cannot recover them.

use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use vista_core::view::NewViewFact;

/// Default queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Log the first drop and then every this many.
const DROP_LOG_EVERY: u64 = 100;

// ─── Policy ──────────────────────────────────────────────────────────────────

/// What a send does when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverflowPolicy {
  /// Drop the incoming fact immediately.
  #[default]
  DropNewest,
  /// Wait up to `millis` for capacity, then drop the incoming fact.
  Block { millis: u64 },
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChannelStats {
  accepted: AtomicU64,
  dropped:  AtomicU64,
  closed:   AtomicU64,
}

/// Point-in-time copy of channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatsSnapshot {
  /// Facts queued for a worker.
  pub accepted: u64,
  /// Facts discarded because the queue stayed full.
  pub dropped:  u64,
  /// Facts discarded because the workers had gone away.
  pub closed:   u64,
}

// ─── Channel ─────────────────────────────────────────────────────────────────

/// Result of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
  Queued,
  Dropped,
  Closed,
}

/// Create a bounded view channel. A capacity of zero is raised to one.
pub fn view_channel(
  capacity: usize,
  overflow: OverflowPolicy,
) -> (ViewSender, ViewReceiver) {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  let sender = ViewSender {
    tx,
    overflow,
    stats: Arc::new(ChannelStats::default()),
  };
  (sender, ViewReceiver { rx })
}

/// Producer half. Cloned freely across request tasks.
#[derive(Debug, Clone)]
pub struct ViewSender {
  tx:       mpsc::Sender<NewViewFact>,
  overflow: OverflowPolicy,
  stats:    Arc<ChannelStats>,
}

impl ViewSender {
  /// Queue `fact` for the workers, applying the overflow policy.
  pub async fn send(&self, fact: NewViewFact) -> SendOutcome {
    let result = match self.overflow {
      OverflowPolicy::DropNewest => self.tx.try_send(fact).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => SendOutcome::Dropped,
        mpsc::error::TrySendError::Closed(_) => SendOutcome::Closed,
      }),
      OverflowPolicy::Block { millis } => {
        match self
          .tx
          .send_timeout(fact, Duration::from_millis(millis))
          .await
        {
          Ok(()) => Ok(()),
          Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
            Err(SendOutcome::Dropped)
          }
          Err(mpsc::error::SendTimeoutError::Closed(_)) => {
            Err(SendOutcome::Closed)
          }
        }
      }
    };

    match result {
      Ok(()) => {
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        SendOutcome::Queued
      }
      Err(SendOutcome::Closed) => {
        let n = self.stats.closed.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 || n % DROP_LOG_EVERY == 0 {
          tracing::warn!(closed = n, "view channel closed; dropping fact");
        }
        SendOutcome::Closed
      }
      Err(_) => {
        let n = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 || n % DROP_LOG_EVERY == 0 {
          tracing::warn!(dropped = n, "view channel full; dropping fact");
        }
        SendOutcome::Dropped
      }
    }
  }

  pub fn stats(&self) -> ChannelStatsSnapshot {
    ChannelStatsSnapshot {
      accepted: self.stats.accepted.load(Ordering::Relaxed),
      dropped:  self.stats.dropped.load(Ordering::Relaxed),
      closed:   self.stats.closed.load(Ordering::Relaxed),
    }
  }
}

/// Consumer half, shared by the worker pool.
#[derive(Debug)]
pub struct ViewReceiver {
  rx: mpsc::Receiver<NewViewFact>,
}

impl ViewReceiver {
  /// Next fact, or `None` once every sender is gone and the queue is empty.
  pub async fn recv(&mut self) -> Option<NewViewFact> { self.rx.recv().await }

  /// A fact if one is already queued.
  pub fn try_recv(&mut self) -> Option<NewViewFact> { self.rx.try_recv().ok() }
}
