//! Engine tuning, deserialised from the `[engine]` configuration table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
  capture::CapturePolicy,
  channel::{DEFAULT_CHANNEL_CAPACITY, OverflowPolicy},
  reconcile::{DEFAULT_RECONCILE_INTERVAL_SECS, ReconcileScope},
  worker::DEFAULT_WORKERS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub channel_capacity: usize,
  pub workers:          usize,
  pub overflow:         OverflowPolicy,
  pub reconcile:        ReconcileConfig,
  pub capture:          CapturePolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      channel_capacity: DEFAULT_CHANNEL_CAPACITY,
      workers:          DEFAULT_WORKERS,
      overflow:         OverflowPolicy::default(),
      reconcile:        ReconcileConfig::default(),
      capture:          CapturePolicy::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  /// Seconds between runs; 0 disables scheduled reconciliation.
  pub interval_secs: u64,
  pub scope:         ReconcileScope,
}

impl Default for ReconcileConfig {
  fn default() -> Self {
    Self {
      interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
      scope:         ReconcileScope::default(),
    }
  }
}

impl ReconcileConfig {
  pub fn interval(&self) -> Option<Duration> {
    (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
  }
}
