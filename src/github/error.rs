use thiserror::Error;

use super::identifier::IdentifierError;

/// Why a repository fetch failed.
///
/// Upstream detail is kept for logs; none of it is part of the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  #[error("invalid repository identifier: {0}")]
  InvalidInput(#[from] IdentifierError),
  #[error("repository not found")]
  NotFound,
  #[error("upstream quota exhausted (HTTP {status})")]
  RateLimited { status: u16 },
  #[error("upstream error: {0}")]
  Upstream(String),
}

impl FetchError {
  /// Map a non-success HTTP status from the primary call.
  pub fn from_status(status: u16, body: &str) -> Self {
    match status {
      403 | 429 => FetchError::RateLimited { status },
      404 => FetchError::NotFound,
      _ => {
        let excerpt: String = body.chars().take(200).collect();
        FetchError::Upstream(format!("HTTP {}: {}", status, excerpt))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classifies_statuses() {
    assert_eq!(FetchError::from_status(403, ""), FetchError::RateLimited { status: 403 });
    assert_eq!(FetchError::from_status(429, ""), FetchError::RateLimited { status: 429 });
    assert_eq!(FetchError::from_status(404, ""), FetchError::NotFound);
    assert!(matches!(FetchError::from_status(500, "boom"), FetchError::Upstream(m) if m.contains("500")));
    assert!(matches!(FetchError::from_status(301, ""), FetchError::Upstream(_)));
  }
}
