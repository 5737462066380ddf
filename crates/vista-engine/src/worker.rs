//! Background workers draining the view channel.

use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinSet};
use vista_core::{store::AnalyticsStore, view::NewViewFact};

use crate::{
  Result, channel::ViewReceiver, recompute::Recomputer, shutdown::Shutdown,
};

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 4;

/// A set of worker tasks sharing one receiver.
#[derive(Debug)]
pub struct WorkerPool {
  tasks: JoinSet<usize>,
}

/// Spawn `count` workers (at least one) on the current runtime.
///
/// Each worker takes the next fact, processes it fully and repeats. Workers
/// exit once every sender is gone and the queue is empty. After `shutdown`
/// fires they keep going only while facts are already queued.
pub fn spawn_workers<S>(
  count: usize,
  receiver: ViewReceiver,
  recomputer: Recomputer<S>,
  shutdown: Shutdown,
) -> WorkerPool
where
  S: AnalyticsStore + 'static,
{
  let receiver = Arc::new(Mutex::new(receiver));
  let mut tasks = JoinSet::new();

  for id in 0..count.max(1) {
    let receiver = Arc::clone(&receiver);
    let recomputer = recomputer.clone();
    let shutdown = shutdown.clone();
    tasks.spawn(async move {
      let mut processed = 0_usize;
      while let Some(fact) = next_fact(&receiver, &shutdown).await {
        recomputer.process(fact).await;
        processed += 1;
      }
      tracing::debug!(worker = id, processed, "view worker stopped");
      processed
    });
  }

  WorkerPool { tasks }
}

async fn next_fact(
  receiver: &Mutex<ViewReceiver>,
  shutdown: &Shutdown,
) -> Option<NewViewFact> {
  let mut rx = receiver.lock().await;
  if shutdown.is_triggered() {
    return rx.try_recv();
  }
  tokio::select! {
    biased;
    fact = rx.recv() => fact,
    () = shutdown.wait() => rx.try_recv(),
  }
}

impl WorkerPool {
  /// Wait for every worker to finish; returns the number of facts processed.
  pub async fn join(mut self) -> Result<usize> {
    let mut processed = 0;
    while let Some(res) = self.tasks.join_next().await {
      processed += res?;
    }
    Ok(processed)
  }

  /// Number of workers still running.
  pub fn len(&self) -> usize { self.tasks.len() }

  pub fn is_empty(&self) -> bool { self.tasks.is_empty() }
}
