//! Cancellable periodic housekeeping.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A background task that runs a closure on a fixed period until stopped.
///
/// The task is bound to this handle: calling [`PeriodicTask::stop`] ends it
/// gracefully, and dropping the handle aborts it so no timer outlives its owner.
pub struct PeriodicTask {
  stop_tx: Option<oneshot::Sender<()>>,
  handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
  /// Spawn a task that calls `tick` every `period`.
  ///
  /// The first call happens one full period after spawning. Must be called from
  /// within a tokio runtime.
  pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
  where
    F: FnMut() + Send + 'static,
  {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // interval() fires immediately; skip that so work starts after one period
      interval.tick().await;

      loop {
        tokio::select! {
          _ = &mut stop_rx => break,
          _ = interval.tick() => {
            tracing::trace!(task = name, "periodic tick");
            tick();
          }
        }
      }
      tracing::debug!(task = name, "periodic task stopped");
    });

    Self {
      stop_tx: Some(stop_tx),
      handle: Some(handle),
    }
  }

  /// Signal the task to stop and wait for it to finish.
  pub async fn stop(mut self) {
    if let Some(tx) = self.stop_tx.take() {
      let _ = tx.send(());
    }
    if let Some(handle) = self.handle.take() {
      let _ = handle.await;
    }
  }
}

impl Drop for PeriodicTask {
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }
}
