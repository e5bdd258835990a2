//! Per-key de-duplication of concurrent fetches.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type Flight<V> = Shared<BoxFuture<'static, V>>;

/// Tracks in-flight operations by key so concurrent callers share one result.
///
/// The first caller for a key starts the operation; callers arriving while it
/// runs await the same shared future. The slot is released as soon as the
/// starting caller finishes or is dropped, so the next caller after that starts
/// a new operation.
pub struct InFlight<V> {
  calls: Arc<Mutex<HashMap<String, Flight<V>>>>,
}

impl<V> InFlight<V>
where
  V: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      calls: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn calls(&self) -> MutexGuard<'_, HashMap<String, Flight<V>>> {
    self.calls.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Run `start()` for `key`, or join the run already in progress.
  ///
  /// `start` is only invoked when no run for `key` is in flight.
  pub async fn run<F, Fut>(&self, key: &str, start: F) -> V
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = V> + Send + 'static,
  {
    let (flight, _slot) = {
      let mut calls = self.calls();
      match calls.get(key) {
        Some(flight) => {
          tracing::debug!(key, "joining in-flight fetch");
          (flight.clone(), None)
        }
        None => {
          let flight = start().boxed().shared();
          calls.insert(key.to_string(), flight.clone());
          let slot = Slot {
            calls: Arc::clone(&self.calls),
            key: key.to_string(),
          };
          (flight, Some(slot))
        }
      }
    };

    flight.await
  }

  /// Number of keys currently being fetched.
  pub fn len(&self) -> usize {
    self.calls().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V> Default for InFlight<V>
where
  V: Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Removes the owner's entry when dropped, whether the run finished or not.
struct Slot<V> {
  calls: Arc<Mutex<HashMap<String, Flight<V>>>>,
  key: String,
}

impl<V> Drop for Slot<V> {
  fn drop(&mut self) {
    self
      .calls
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .remove(&self.key);
  }
}
