//! Rate-limited, stale-tolerant cache in front of the GitHub repository API.
//!
//! A lookup passes through [`limiter`] (per-caller fixed-window throttling),
//! then [`cache`] (TTL-checked SQLite entries with per-key fetch
//! de-duplication), and only on a miss reaches [`github`]. When a refresh
//! fails, the expired entry is served instead of the error.

pub mod cache;
pub mod clock;
pub mod config;
pub mod github;
pub mod limiter;
pub mod schedule;
pub mod service;

pub use service::{ResourceService, ServiceError, TierLimits};
