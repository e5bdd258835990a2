use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::github::BackoffPolicy;
use crate::limiter::TierLimit;

/// Upper bound for every minute-valued setting (100 years).
pub const MAX_MINUTES: i64 = 100 * 365 * 24 * 60;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub github: GithubConfig,
  pub cache: CacheConfig,
  pub rate_limits: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GithubConfig {
  /// API base URL, without trailing slash
  pub api_url: String,
  /// Sent as User-Agent on every call (GitHub rejects requests without one)
  pub user_agent: String,
  /// Per-call timeout
  pub timeout_secs: u64,
  pub backoff: BackoffConfig,
}

impl Default for GithubConfig {
  fn default() -> Self {
    Self {
      api_url: "https://api.github.com".to_string(),
      user_agent: concat!("repo-cache/", env!("CARGO_PKG_VERSION")).to_string(),
      timeout_secs: 10,
      backoff: BackoffConfig::default(),
    }
  }
}

impl GithubConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
  pub credentialed_delay_ms: u64,
  pub anonymous_delay_ms: u64,
  pub multiplier: f64,
}

impl Default for BackoffConfig {
  fn default() -> Self {
    Self {
      credentialed_delay_ms: BackoffPolicy::DEFAULT_CREDENTIALED_DELAY.as_millis() as u64,
      anonymous_delay_ms: BackoffPolicy::DEFAULT_ANONYMOUS_DELAY.as_millis() as u64,
      multiplier: 1.0,
    }
  }
}

impl BackoffConfig {
  pub fn policy(&self, credentialed: bool) -> BackoffPolicy {
    BackoffPolicy {
      credentialed_delay: Duration::from_millis(self.credentialed_delay_ms),
      anonymous_delay: Duration::from_millis(self.anonymous_delay_ms),
      multiplier: self.multiplier,
      credentialed,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
  /// Database file; defaults to the user data directory
  pub path: Option<PathBuf>,
  pub ttl_minutes: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      ttl_minutes: 6 * 60,
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.ttl_minutes.clamp(0, MAX_MINUTES))
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
  pub window_minutes: i64,
  pub general: u32,
  pub authenticated: u32,
  pub privileged: u32,
  /// How often expired counters are swept
  pub sweep_minutes: u64,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      window_minutes: 15,
      general: 60,
      authenticated: 300,
      privileged: 1000,
      sweep_minutes: 5,
    }
  }
}

impl RateLimitConfig {
  fn tier(&self, limit: u32) -> TierLimit {
    TierLimit {
      limit,
      window: chrono::Duration::minutes(self.window_minutes.clamp(0, MAX_MINUTES)),
    }
  }

  pub fn general_limit(&self) -> TierLimit {
    self.tier(self.general)
  }

  pub fn authenticated_limit(&self) -> TierLimit {
    self.tier(self.authenticated)
  }

  pub fn privileged_limit(&self) -> TierLimit {
    self.tier(self.privileged)
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_minutes.min(MAX_MINUTES as u64) * 60)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./repo-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/repo-cache/config.yaml
  ///
  /// With no file anywhere, the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => {
        tracing::debug!(path = %p.display(), "loading config");
        Self::load_from_path(&p)?
      }
      None => Config::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("repo-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("repo-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if !(1..=MAX_MINUTES).contains(&self.cache.ttl_minutes) {
      return Err(eyre!("cache.ttl_minutes must be between 1 and {}", MAX_MINUTES));
    }
    if !(1..=MAX_MINUTES).contains(&self.rate_limits.window_minutes) {
      return Err(eyre!("rate_limits.window_minutes must be between 1 and {}", MAX_MINUTES));
    }
    let limits = &self.rate_limits;
    if limits.general == 0 || limits.authenticated == 0 || limits.privileged == 0 {
      return Err(eyre!("rate limits must allow at least one request per window"));
    }
    if limits.sweep_minutes == 0 || limits.sweep_minutes > MAX_MINUTES as u64 {
      return Err(eyre!("rate_limits.sweep_minutes must be between 1 and {}", MAX_MINUTES));
    }
    if self.github.timeout_secs == 0 {
      return Err(eyre!("github.timeout_secs must be positive"));
    }
    Ok(())
  }

  /// Get the GitHub API token from environment variables.
  ///
  /// Checks REPO_CACHE_GITHUB_TOKEN first, then GITHUB_TOKEN as fallback.
  /// Running without a token is allowed, at GitHub's lower anonymous quota.
  pub fn get_api_token() -> Option<String> {
    std::env::var("REPO_CACHE_GITHUB_TOKEN")
      .or_else(|_| std::env::var("GITHUB_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
