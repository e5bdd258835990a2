use chrono::Duration;
use std::sync::Arc;

use repo_cache::clock::{Clock, ManualClock};
use repo_cache::limiter::RateLimiter;

fn limiter() -> (Arc<ManualClock>, RateLimiter) {
  let clock = Arc::new(ManualClock::default());
  (clock.clone(), RateLimiter::new(clock))
}

#[test]
fn two_per_minute_then_reset() {
  let (clock, limiter) = limiter();
  let window = Duration::milliseconds(60_000);

  let results: Vec<bool> = (0..3).map(|_| limiter.check("userA", 2, window)).collect();
  assert_eq!(results, vec![true, true, false]);

  clock.advance(Duration::seconds(61));
  assert!(limiter.check("userA", 2, window));
}

#[test]
fn n_calls_allowed_and_next_denied_for_many_identities() {
  let (_clock, limiter) = limiter();
  let window = Duration::minutes(15);

  for n in 1..=5u32 {
    let identity = format!("user-{}", n);
    for _ in 0..n {
      assert!(limiter.check(&identity, n, window));
    }
    assert!(!limiter.check(&identity, n, window));
  }
}

#[test]
fn denials_do_not_extend_the_window() {
  let (clock, limiter) = limiter();
  let window = Duration::seconds(30);

  assert!(limiter.check("spammer", 1, window));
  for _ in 0..20 {
    clock.advance(Duration::seconds(1));
    assert!(!limiter.check("spammer", 1, window));
  }

  clock.advance(Duration::seconds(10));
  assert!(limiter.check("spammer", 1, window));
  assert_eq!(
    limiter.reset_at("spammer"),
    Some(clock.now() + window)
  );
}

#[test]
fn sweep_bounds_memory_for_idle_identities() {
  let (clock, limiter) = limiter();
  for i in 0..100 {
    limiter.check(&format!("visitor-{}", i), 10, Duration::minutes(15));
  }
  assert_eq!(limiter.len(), 100);

  clock.advance(Duration::minutes(10));
  assert_eq!(limiter.sweep(), 0);

  clock.advance(Duration::minutes(6));
  assert_eq!(limiter.sweep(), 100);
  assert!(limiter.is_empty());
}
