//! Wiring of capture, channel, workers, reconciliation and queries.

use std::sync::Arc;

use tokio::task::JoinHandle;
use vista_core::{store::AnalyticsStore, window::Clock};

use crate::{
  Result,
  capture::Capture,
  channel::{ChannelStatsSnapshot, ViewSender, view_channel},
  config::EngineConfig,
  query::QueryService,
  reconcile::Reconciler,
  recompute::{RecomputeStatsSnapshot, Recomputer},
  shutdown::{Shutdown, ShutdownTrigger, shutdown_channel},
  worker::{WorkerPool, spawn_workers},
};

/// A running analytics pipeline over one store.
pub struct Pipeline<S> {
  capture:    Capture,
  sender:     ViewSender,
  query:      QueryService<S>,
  recomputer: Recomputer<S>,
  reconciler: Reconciler<S>,
  workers:    WorkerPool,
  scheduled:  Option<JoinHandle<()>>,
  trigger:    ShutdownTrigger,
}

impl<S: AnalyticsStore + 'static> Pipeline<S> {
  /// Spawn the workers and, when an interval is configured, the scheduled
  /// reconciliation task. Must be called inside a tokio runtime.
  pub fn start(store: Arc<S>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
    let (trigger, shutdown) = shutdown_channel();
    let (sender, receiver) = view_channel(config.channel_capacity, config.overflow);

    let recomputer = Recomputer::new(Arc::clone(&store), Arc::clone(&clock));
    let reconciler = Reconciler::new(recomputer.clone(), config.reconcile.scope);
    let workers = spawn_workers(
      config.workers,
      receiver,
      recomputer.clone(),
      shutdown.clone(),
    );

    let scheduled = config.reconcile.interval().map(|interval| {
      let reconciler = reconciler.clone();
      let shutdown = shutdown.clone();
      tokio::spawn(async move { reconciler.run_every(interval, shutdown).await })
    });

    tracing::info!(
      workers = config.workers.max(1),
      channel_capacity = config.channel_capacity.max(1),
      reconcile_interval_secs = config.reconcile.interval_secs,
      "analytics pipeline started"
    );

    Self {
      capture: Capture::new(config.capture.clone(), sender.clone(), Arc::clone(&clock)),
      sender,
      query: QueryService::new(store, clock),
      recomputer,
      reconciler,
      workers,
      scheduled,
      trigger,
    }
  }

  /// A handle for the request side. Cheap to clone.
  pub fn capture(&self) -> Capture { self.capture.clone() }

  pub fn query(&self) -> QueryService<S> { self.query.clone() }

  pub fn reconciler(&self) -> &Reconciler<S> { &self.reconciler }

  /// The signal the pipeline's own tasks observe.
  pub fn shutdown_signal(&self) -> Shutdown { self.trigger.subscribe() }

  pub fn channel_stats(&self) -> ChannelStatsSnapshot { self.sender.stats() }

  pub fn recompute_stats(&self) -> RecomputeStatsSnapshot { self.recomputer.stats() }

  /// Stop reconciliation, let the workers drain whatever is queued and wait
  /// for them. Returns the number of facts the workers processed.
  pub async fn shutdown(self) -> Result<usize> {
    let Self {
      capture,
      sender,
      workers,
      scheduled,
      trigger,
      ..
    } = self;

    trigger.trigger();
    drop(capture);
    drop(sender);

    if let Some(task) = scheduled {
      task.await?;
    }
    let processed = workers.join().await?;
    tracing::info!(processed, "analytics pipeline stopped");
    Ok(processed)
  }
}
