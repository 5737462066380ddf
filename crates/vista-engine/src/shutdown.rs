//! Cooperative shutdown signalling.

use tokio::sync::watch;

/// Create a linked trigger and signal.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
  let (tx, rx) = watch::channel(false);
  (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Fires the shutdown signal. Firing more than once is harmless.
#[derive(Debug)]
pub struct ShutdownTrigger {
  tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
  pub fn trigger(&self) { self.tx.send_replace(true); }

  pub fn subscribe(&self) -> Shutdown { Shutdown { rx: self.tx.subscribe() } }
}

/// Observes the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
  rx: watch::Receiver<bool>,
}

impl Shutdown {
  /// Whether shutdown has been requested. Never blocks.
  pub fn is_triggered(&self) -> bool { *self.rx.borrow() }

  /// Resolve once shutdown is requested, or once the trigger is dropped.
  pub async fn wait(&self) {
    let mut rx = self.rx.clone();
    let _ = rx.wait_for(|triggered| *triggered).await;
  }
}
