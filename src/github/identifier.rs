//! Parsing user-supplied repository references into a canonical id.

use std::fmt;
use thiserror::Error;
use url::Url;

const HOST: &str = "github.com";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
  #[error("repository identifier is empty")]
  Empty,
  #[error("unsupported host '{0}', only github.com repositories are supported")]
  UnsupportedHost(String),
  #[error("expected an owner and a repository name")]
  MissingRepository,
  #[error("'{0}' is not a valid GitHub owner or repository name")]
  InvalidName(String),
  #[error("could not parse '{0}' as a repository reference")]
  Malformed(String),
}

/// A GitHub repository, normalized to lowercase owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
  owner: String,
  name: String,
}

impl RepoId {
  /// Parse any of the accepted reference forms.
  ///
  /// Accepts `owner/repo`, `github.com/owner/repo`, `https://github.com/owner/repo`
  /// (optionally with `www.`, a `.git` suffix, or trailing path segments such as
  /// `/tree/main`) and `git@github.com:owner/repo.git`.
  pub fn parse(input: &str) -> Result<Self, IdentifierError> {
    let input = input.trim();
    if input.is_empty() {
      return Err(IdentifierError::Empty);
    }

    let path = if let Some(rest) = input.strip_prefix("git@github.com:") {
      rest.to_string()
    } else if input.contains("://") {
      Self::url_path(input)?
    } else if input.starts_with("github.com/") || input.starts_with("www.github.com/") {
      Self::url_path(&format!("https://{}", input))?
    } else if input.contains('.') && input.split('/').next().is_some_and(|h| h.contains('.')) {
      // Looks like some other host, e.g. gitlab.com/owner/repo
      let host = input.split('/').next().unwrap_or_default();
      return Err(IdentifierError::UnsupportedHost(host.to_string()));
    } else {
      input.to_string()
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next().ok_or(IdentifierError::MissingRepository)?;
    let name = segments.next().ok_or(IdentifierError::MissingRepository)?;
    let name = name.strip_suffix(".git").unwrap_or(name);

    if !valid_owner(owner) {
      return Err(IdentifierError::InvalidName(owner.to_string()));
    }
    if !valid_repo(name) {
      return Err(IdentifierError::InvalidName(name.to_string()));
    }

    Ok(Self {
      owner: owner.to_lowercase(),
      name: name.to_lowercase(),
    })
  }

  fn url_path(input: &str) -> Result<String, IdentifierError> {
    let url = Url::parse(input).map_err(|_| IdentifierError::Malformed(input.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(IdentifierError::Malformed(input.to_string()));
    }
    let host = url.host_str().unwrap_or_default();
    if host != HOST && host != "www.github.com" {
      return Err(IdentifierError::UnsupportedHost(host.to_string()));
    }
    Ok(url.path().to_string())
  }

  pub fn owner(&self) -> &str {
    &self.owner
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Stable key used for cache lookups, e.g. `github.com/acme/widget`.
  pub fn cache_key(&self) -> String {
    format!("{}/{}/{}", HOST, self.owner, self.name)
  }

  /// REST path of the repository resource.
  pub fn api_path(&self) -> String {
    format!("/repos/{}/{}", self.owner, self.name)
  }
}

impl fmt::Display for RepoId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.owner, self.name)
  }
}

/// GitHub logins: alphanumerics and single hyphens, at most 39 characters.
fn valid_owner(owner: &str) -> bool {
  !owner.is_empty()
    && owner.len() <= 39
    && !owner.starts_with('-')
    && !owner.ends_with('-')
    && owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn valid_repo(name: &str) -> bool {
  !name.is_empty()
    && name.len() <= 100
    && name != "."
    && name != ".."
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
