//! Request entry point: throttling, cache lookup, fetch and fallback.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::{CacheLayer, CacheResult, CacheStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::github::{FetchError, GitHubClient, RepoId, RepoReadme, RepoSnapshot, RepoStats, Transport};
use crate::limiter::{Caller, TierLimit, TieredLimiter};
use crate::schedule::PeriodicTask;

/// Failure surfaced to callers.
///
/// Messages are terse and never include upstream response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
  #[error("too many requests, slow down")]
  Throttled,
  #[error("invalid repository reference: {0}")]
  InvalidInput(String),
  #[error("repository not found")]
  NotFound,
  #[error("repository data is temporarily unavailable (upstream quota exhausted)")]
  QuotaExhausted,
  #[error("repository data is temporarily unavailable")]
  Unavailable,
}

impl ServiceError {
  /// Whether the same request may succeed later without changes.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ServiceError::Throttled | ServiceError::QuotaExhausted | ServiceError::Unavailable
    )
  }
}

impl From<FetchError> for ServiceError {
  fn from(error: FetchError) -> Self {
    match error {
      FetchError::InvalidInput(e) => ServiceError::InvalidInput(e.to_string()),
      FetchError::NotFound => ServiceError::NotFound,
      FetchError::RateLimited { .. } => ServiceError::QuotaExhausted,
      FetchError::Upstream(_) => ServiceError::Unavailable,
    }
  }
}

/// Rate limits for each caller tier.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
  pub general: TierLimit,
  pub authenticated: TierLimit,
  pub privileged: TierLimit,
}

impl From<&Config> for TierLimits {
  fn from(config: &Config) -> Self {
    Self {
      general: config.rate_limits.general_limit(),
      authenticated: config.rate_limits.authenticated_limit(),
      privileged: config.rate_limits.privileged_limit(),
    }
  }
}

/// Serves repository data to callers.
///
/// Every lookup is charged against the caller's rate limit tier, then served
/// from cache when fresh, refetched otherwise, and falls back to the expired
/// entry when the refetch fails.
pub struct ResourceService<S, T> {
  limiter: Arc<TieredLimiter>,
  cache: CacheLayer<S, RepoSnapshot, FetchError>,
  client: Arc<GitHubClient<T>>,
  housekeeping: Mutex<Option<PeriodicTask>>,
}

impl<S, T> ResourceService<S, T>
where
  S: CacheStore,
  T: Transport,
{
  pub fn new(
    store: Arc<S>,
    client: GitHubClient<T>,
    clock: Arc<dyn Clock>,
    limits: TierLimits,
    ttl: chrono::Duration,
  ) -> Self {
    let limiter = TieredLimiter::new(
      Arc::clone(&clock),
      limits.general,
      limits.authenticated,
      limits.privileged,
    );
    Self {
      limiter: Arc::new(limiter),
      cache: CacheLayer::new(store, clock, ttl),
      client: Arc::new(client),
      housekeeping: Mutex::new(None),
    }
  }

  /// Start sweeping expired rate limit counters every `interval`.
  ///
  /// Replaces any sweep already running. Requires a tokio runtime.
  pub async fn start_housekeeping(&self, interval: std::time::Duration) {
    let limiter = Arc::clone(&self.limiter);
    let task = PeriodicTask::spawn("rate-limit-sweep", interval, move || {
      let removed = limiter.sweep();
      if removed > 0 {
        tracing::debug!(removed, "swept expired rate limit counters");
      }
    });

    if let Some(previous) = self.housekeeping.lock().await.replace(task) {
      previous.stop().await;
    }
  }

  /// Stop background housekeeping.
  pub async fn shutdown(&self) {
    if let Some(task) = self.housekeeping.lock().await.take() {
      task.stop().await;
    }
  }

  pub fn limiter(&self) -> &TieredLimiter {
    &self.limiter
  }

  /// Full repository snapshot.
  pub async fn repository(
    &self,
    caller: &Caller,
    identifier: &str,
  ) -> Result<CacheResult<Arc<RepoSnapshot>>, ServiceError> {
    if !self.limiter.check(caller) {
      tracing::info!(identity = %caller.identity, tier = ?caller.tier, "request throttled");
      return Err(ServiceError::Throttled);
    }

    let repo = RepoId::parse(identifier).map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
    let key = repo.cache_key();
    let client = Arc::clone(&self.client);

    let result = self
      .cache
      .fetch_one(&key, move || async move { client.fetch_repo(&repo).await })
      .await;

    result.map_err(|error| {
      tracing::warn!(key = %key, error = %error, "lookup failed with nothing cached");
      ServiceError::from(error)
    })
  }

  /// README projection.
  pub async fn readme(
    &self,
    caller: &Caller,
    identifier: &str,
  ) -> Result<CacheResult<RepoReadme>, ServiceError> {
    let snapshot = self.repository(caller, identifier).await?;
    Ok(snapshot.map(|s| s.readme_view()))
  }

  /// Stats projection.
  pub async fn stats(
    &self,
    caller: &Caller,
    identifier: &str,
  ) -> Result<CacheResult<RepoStats>, ServiceError> {
    let snapshot = self.repository(caller, identifier).await?;
    Ok(snapshot.map(|s| s.stats_view()))
  }
}
