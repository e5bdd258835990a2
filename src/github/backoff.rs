//! Fixed pacing between upstream calls.

use std::time::Duration;

/// Delay inserted between the sequential calls of one repository fetch.
///
/// The delay depends only on the step number and on whether a token is
/// configured; it never reacts to upstream responses.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
  /// Delay before the second call when a token is configured
  pub credentialed_delay: Duration,
  /// Delay before the second call without a token (lower upstream quota)
  pub anonymous_delay: Duration,
  /// Growth factor applied for each later call
  pub multiplier: f64,
  /// Whether requests carry a token
  pub credentialed: bool,
}

impl BackoffPolicy {
  pub const DEFAULT_CREDENTIALED_DELAY: Duration = Duration::from_millis(100);
  pub const DEFAULT_ANONYMOUS_DELAY: Duration = Duration::from_millis(1000);

  pub fn new(credentialed: bool) -> Self {
    Self {
      credentialed_delay: Self::DEFAULT_CREDENTIALED_DELAY,
      anonymous_delay: Self::DEFAULT_ANONYMOUS_DELAY,
      multiplier: 1.0,
      credentialed,
    }
  }

  /// A policy that never waits.
  pub fn none() -> Self {
    Self {
      credentialed_delay: Duration::ZERO,
      anonymous_delay: Duration::ZERO,
      multiplier: 1.0,
      credentialed: false,
    }
  }

  pub fn base_delay(&self) -> Duration {
    if self.credentialed {
      self.credentialed_delay
    } else {
      self.anonymous_delay
    }
  }

  /// Delay to wait before call number `step` (0-based). The first call never waits.
  pub fn delay_before(&self, step: u32) -> Duration {
    if step == 0 {
      return Duration::ZERO;
    }
    let factor = self.multiplier.max(0.0).powi(step as i32 - 1);
    let nanos = self.base_delay().as_nanos() as f64 * factor;
    Duration::from_nanos(nanos.round() as u64)
  }

  /// Sleep for the delay before call number `step`.
  pub async fn wait(&self, step: u32) {
    let delay = self.delay_before(step);
    if !delay.is_zero() {
      tracing::trace!(step, delay_ms = delay.as_millis() as u64, "pacing upstream call");
      tokio::time::sleep(delay).await;
    }
  }
}
