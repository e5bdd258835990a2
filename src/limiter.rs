//! Fixed-window inbound rate limiting.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;

/// Per-identity counter for the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCounter {
  pub count: u32,
  pub window_reset_at: DateTime<Utc>,
}

/// In-memory fixed-window rate limiter keyed by caller identity.
///
/// Each instance is its own keyspace: two limiters never share counters, even
/// for the same identity.
pub struct RateLimiter {
  counters: Mutex<HashMap<String, RateLimitCounter>>,
  clock: Arc<dyn Clock>,
}

impl RateLimiter {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      counters: Mutex::new(HashMap::new()),
      clock,
    }
  }

  fn counters(&self) -> MutexGuard<'_, HashMap<String, RateLimitCounter>> {
    // No critical section leaves the map half-updated
    self.counters.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Record a request from `identity` and report whether it is allowed.
  ///
  /// The read, compare and increment happen under one lock. A denied request
  /// leaves the counter untouched. Invalid arguments (empty identity, zero
  /// limit, non-positive window) deny.
  pub fn check(&self, identity: &str, limit: u32, window: Duration) -> bool {
    if identity.is_empty() || limit == 0 || window <= Duration::zero() {
      tracing::warn!(identity, limit, "rejecting rate limit check with invalid arguments");
      return false;
    }

    let now = self.clock.now();
    let Some(window_reset_at) = now.checked_add_signed(window) else {
      tracing::warn!(identity, "rate limit window out of range");
      return false;
    };
    let mut counters = self.counters();

    if let Some(counter) = counters.get_mut(identity) {
      if counter.window_reset_at > now {
        if counter.count >= limit {
          return false;
        }
        counter.count += 1;
        return true;
      }
    }

    // First request from this identity, or its window has ended
    counters.insert(
      identity.to_string(),
      RateLimitCounter {
        count: 1,
        window_reset_at,
      },
    );
    true
  }

  /// When the current window for `identity` resets, if it has an active counter.
  pub fn reset_at(&self, identity: &str) -> Option<DateTime<Utc>> {
    let now = self.clock.now();
    self
      .counters()
      .get(identity)
      .map(|c| c.window_reset_at)
      .filter(|reset| *reset > now)
  }

  /// Drop counters whose window has already ended. Returns how many were removed.
  pub fn sweep(&self) -> usize {
    let now = self.clock.now();
    let mut counters = self.counters();
    let before = counters.len();
    counters.retain(|_, c| c.window_reset_at > now);
    before - counters.len()
  }

  /// Number of identities currently tracked.
  pub fn len(&self) -> usize {
    self.counters().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Caller class used to pick a rate limit tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Tier {
  /// Anonymous traffic
  General,
  /// Signed-in users
  Authenticated,
  /// Staff and internal jobs
  Privileged,
}

/// Request budget for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimit {
  pub limit: u32,
  pub window: Duration,
}

/// The identity of whoever is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
  pub identity: String,
  pub tier: Tier,
}

impl Caller {
  pub const ANONYMOUS: &'static str = "anonymous";

  pub fn anonymous() -> Self {
    Self {
      identity: Self::ANONYMOUS.to_string(),
      tier: Tier::General,
    }
  }

  pub fn new(identity: impl Into<String>, tier: Tier) -> Self {
    Self {
      identity: identity.into(),
      tier,
    }
  }
}

/// One limiter per tier.
///
/// Tiers keep independent counters: a request is charged against exactly the
/// tier of its caller, so the same identity seen under two tiers has two
/// separate budgets.
pub struct TieredLimiter {
  general: (RateLimiter, TierLimit),
  authenticated: (RateLimiter, TierLimit),
  privileged: (RateLimiter, TierLimit),
}

impl TieredLimiter {
  pub fn new(
    clock: Arc<dyn Clock>,
    general: TierLimit,
    authenticated: TierLimit,
    privileged: TierLimit,
  ) -> Self {
    Self {
      general: (RateLimiter::new(Arc::clone(&clock)), general),
      authenticated: (RateLimiter::new(Arc::clone(&clock)), authenticated),
      privileged: (RateLimiter::new(clock), privileged),
    }
  }

  fn tier(&self, tier: Tier) -> &(RateLimiter, TierLimit) {
    match tier {
      Tier::General => &self.general,
      Tier::Authenticated => &self.authenticated,
      Tier::Privileged => &self.privileged,
    }
  }

  pub fn check(&self, caller: &Caller) -> bool {
    let (limiter, budget) = self.tier(caller.tier);
    limiter.check(&caller.identity, budget.limit, budget.window)
  }

  pub fn limiter(&self, tier: Tier) -> &RateLimiter {
    &self.tier(tier).0
  }

  /// Sweep every tier. Returns the total number of counters removed.
  pub fn sweep(&self) -> usize {
    self.general.0.sweep() + self.authenticated.0.sweep() + self.privileged.0.sweep()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;

  fn limiter() -> (Arc<ManualClock>, RateLimiter) {
    let clock = Arc::new(ManualClock::default());
    let limiter = RateLimiter::new(clock.clone());
    (clock, limiter)
  }

  #[test]
  fn allows_limit_then_denies_then_resets() {
    let (clock, limiter) = limiter();
    let window = Duration::milliseconds(60_000);

    assert!(limiter.check("userA", 2, window));
    assert!(limiter.check("userA", 2, window));
    assert!(!limiter.check("userA", 2, window));

    clock.advance(Duration::seconds(61));
    assert!(limiter.check("userA", 2, window));
  }

  #[test]
  fn denial_does_not_mutate_counter() {
    let (_clock, limiter) = limiter();
    let window = Duration::minutes(1);

    assert!(limiter.check("u", 1, window));
    let reset = limiter.reset_at("u");
    for _ in 0..5 {
      assert!(!limiter.check("u", 1, window));
    }
    assert_eq!(limiter.reset_at("u"), reset);
    assert_eq!(limiter.counters().get("u").map(|c| c.count), Some(1));
  }

  #[test]
  fn identities_are_independent() {
    let (_clock, limiter) = limiter();
    let window = Duration::minutes(1);

    assert!(limiter.check("a", 1, window));
    assert!(!limiter.check("a", 1, window));
    assert!(limiter.check("b", 1, window));
  }

  #[test]
  fn invalid_arguments_deny() {
    let (_clock, limiter) = limiter();
    assert!(!limiter.check("", 5, Duration::minutes(1)));
    assert!(!limiter.check("a", 0, Duration::minutes(1)));
    assert!(!limiter.check("a", 5, Duration::zero()));
    assert!(limiter.is_empty());
  }

  #[test]
  fn out_of_range_window_denies() {
    let (_clock, limiter) = limiter();
    assert!(!limiter.check("a", 5, Duration::days(365 * 1_000_000)));
    assert!(limiter.is_empty());
  }

  #[test]
  fn sweep_removes_only_expired_counters() {
    let (clock, limiter) = limiter();
    limiter.check("old", 10, Duration::seconds(30));
    limiter.check("new", 10, Duration::minutes(10));

    clock.advance(Duration::seconds(31));
    assert_eq!(limiter.sweep(), 1);
    assert_eq!(limiter.len(), 1);
    assert!(limiter.reset_at("new").is_some());
    assert!(limiter.reset_at("old").is_none());
  }

  #[test]
  fn window_reset_at_boundary_starts_new_window() {
    let (clock, limiter) = limiter();
    let window = Duration::seconds(10);
    assert!(limiter.check("a", 1, window));
    clock.advance(Duration::seconds(10));
    assert!(limiter.check("a", 1, window));
  }

  #[test]
  fn concurrent_checks_never_exceed_limit() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let limiter = Arc::new(RateLimiter::new(clock));
    let handles: Vec<_> = (0..16)
      .map(|_| {
        let limiter = Arc::clone(&limiter);
        std::thread::spawn(move || {
          (0..100)
            .filter(|_| limiter.check("shared", 250, Duration::minutes(1)))
            .count()
        })
      })
      .collect();

    let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(allowed, 250);
  }

  #[test]
  fn tiers_keep_separate_budgets() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let one = TierLimit {
      limit: 1,
      window: Duration::minutes(15),
    };
    let tiers = TieredLimiter::new(clock, one, one, one);

    let general = Caller::new("alice", Tier::General);
    let privileged = Caller::new("alice", Tier::Privileged);

    assert!(tiers.check(&general));
    assert!(!tiers.check(&general));
    assert!(tiers.check(&privileged));
    assert_eq!(tiers.limiter(Tier::Authenticated).len(), 0);
  }
}
