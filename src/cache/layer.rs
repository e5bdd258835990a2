//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use super::inflight::InFlight;
use super::result::CacheResult;
use super::storage::{CacheEntry, CacheStore};
use crate::clock::Clock;

/// Cache layer that manages caching logic and network fetching.
///
/// Sits between the service and the upstream client: fresh entries are served
/// directly, misses and expired entries are refetched (one fetch per key at a
/// time), and an expired entry is served in place of a failed refetch.
pub struct CacheLayer<S, T, E> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
  /// How long a fetched value is considered fresh
  ttl: Duration,
  in_flight: InFlight<Result<Fetched<T>, E>>,
}

/// Outcome of a shared fetch run.
struct Fetched<T> {
  value: Arc<T>,
  /// Set when another run stored a fresh value before this one started
  cached_at: Option<DateTime<Utc>>,
}

impl<T> Clone for Fetched<T> {
  fn clone(&self) -> Self {
    Self {
      value: Arc::clone(&self.value),
      cached_at: self.cached_at,
    }
  }
}

impl<S, T, E> CacheLayer<S, T, E>
where
  S: CacheStore,
  T: Serialize + DeserializeOwned + Send + Sync + 'static,
  E: Clone + Display + Send + Sync + 'static,
{
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
    Self {
      storage,
      clock,
      ttl,
      in_flight: InFlight::new(),
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Read an entry, treating storage failures as a miss.
  fn lookup(&self, key: &str) -> Option<CacheEntry<T>> {
    match self.storage.get::<T>(key) {
      Ok(entry) => entry,
      Err(error) => {
        tracing::warn!(key, error = %error, "cache read failed; treating as miss");
        None
      }
    }
  }

  /// Fetch a single value with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network (shared with concurrent callers)
  /// 3. On success, store with the layer's TTL and return the new value
  /// 4. On failure, return the expired entry if there is one, else the error
  pub async fn fetch_one<F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<Arc<T>>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
  {
    let cached = match self.lookup(key) {
      Some(entry) if entry.is_fresh(self.clock.now()) => {
        tracing::debug!(key, "cache hit");
        return Ok(CacheResult::from_cache(
          Arc::new(entry.payload),
          entry.fetched_at,
          false,
        ));
      }
      other => other,
    };

    tracing::debug!(key, cached = cached.is_some(), "cache miss; fetching");

    let storage = Arc::clone(&self.storage);
    let clock = Arc::clone(&self.clock);
    let ttl = self.ttl;
    let owned_key = key.to_string();
    let fetched = self
      .in_flight
      .run(key, move || {
        let fut = fetcher();
        async move {
          // A run that finished between our lookup and taking the slot already stored a fresh value
          if let Ok(Some(entry)) = storage.get::<T>(&owned_key) {
            if entry.is_fresh(clock.now()) {
              return Ok(Fetched {
                value: Arc::new(entry.payload),
                cached_at: Some(entry.fetched_at),
              });
            }
          }

          let value = match fut.await {
            Ok(value) => Arc::new(value),
            Err(error) => return Err(error),
          };
          // Persisted inside the shared run so concurrent callers write once
          if let Err(error) = storage.upsert(&owned_key, value.as_ref(), ttl) {
            tracing::warn!(key = %owned_key, error = %error, "failed to persist fetched value");
          }
          Ok(Fetched {
            value,
            cached_at: None,
          })
        }
      })
      .await;

    match (fetched, cached) {
      (Ok(Fetched { value, cached_at: None }), _) => Ok(CacheResult::from_network(value)),
      (Ok(Fetched { value, cached_at: Some(at) }), _) => Ok(CacheResult::from_cache(value, at, false)),
      (Err(error), Some(entry)) => {
        tracing::warn!(key, error = %error, fetched_at = %entry.fetched_at, "refresh failed; serving stale entry");
        Ok(CacheResult::from_cache(
          Arc::new(entry.payload),
          entry.fetched_at,
          true,
        ))
      }
      (Err(error), None) => Err(error),
    }
  }
}
