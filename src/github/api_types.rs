//! Serde-deserializable types matching GitHub REST responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on what the cache stores.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::RepoMetadata;

// ============================================================================
// GET /repos/{owner}/{repo}
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiOwner {
  pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLicense {
  pub name: Option<String>,
  pub spdx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiRepository {
  pub name: String,
  pub full_name: String,
  pub owner: ApiOwner,
  pub description: Option<String>,
  pub html_url: String,
  pub homepage: Option<String>,
  pub language: Option<String>,
  #[serde(default)]
  pub topics: Vec<String>,
  pub license: Option<ApiLicense>,
  #[serde(default)]
  pub default_branch: String,
  #[serde(default)]
  pub stargazers_count: u64,
  #[serde(default)]
  pub forks_count: u64,
  #[serde(default)]
  pub open_issues_count: u64,
  /// The REST API reports watchers under `subscribers_count`; `watchers_count` mirrors stars
  #[serde(default)]
  pub subscribers_count: u64,
  #[serde(default)]
  pub archived: bool,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
  pub pushed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// GET /repos/{owner}/{repo}/readme
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiReadme {
  pub content: String,
  #[serde(default)]
  pub encoding: String,
}

impl ApiReadme {
  /// Decode the README text.
  ///
  /// GitHub wraps the base64 payload at 60 columns, so whitespace is stripped
  /// before decoding.
  pub fn decode(&self) -> Result<String, String> {
    if !self.encoding.is_empty() && self.encoding != "base64" {
      return Err(format!("unsupported readme encoding '{}'", self.encoding));
    }
    let compact: String = self
      .content
      .chars()
      .filter(|c| !c.is_ascii_whitespace())
      .collect();
    let bytes = STANDARD
      .decode(compact.as_bytes())
      .map_err(|e| format!("invalid base64 readme: {}", e))?;
    String::from_utf8(bytes).map_err(|e| format!("readme is not utf-8: {}", e))
  }
}

// ============================================================================
// GET /repos/{owner}/{repo}/commits?per_page=1
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSignature {
  pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommitDetail {
  pub author: Option<ApiSignature>,
  pub committer: Option<ApiSignature>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommit {
  pub commit: ApiCommitDetail,
}

impl ApiCommit {
  /// Committer date, falling back to the author date.
  pub fn date(&self) -> Option<DateTime<Utc>> {
    let committed = self.commit.committer.as_ref().and_then(|s| s.date);
    committed.or_else(|| self.commit.author.as_ref().and_then(|s| s.date))
  }
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiRepository> for RepoMetadata {
  fn from(repo: ApiRepository) -> Self {
    RepoMetadata {
      full_name: repo.full_name,
      owner: repo.owner.login,
      name: repo.name,
      description: repo.description,
      html_url: repo.html_url,
      homepage: repo.homepage.filter(|h| !h.is_empty()),
      language: repo.language,
      topics: repo.topics,
      license: repo.license.and_then(|l| l.name.or(l.spdx_id)),
      default_branch: repo.default_branch,
      stars: repo.stargazers_count,
      forks: repo.forks_count,
      open_issues: repo.open_issues_count,
      watchers: repo.subscribers_count,
      archived: repo.archived,
      created_at: repo.created_at,
      updated_at: repo.updated_at,
      pushed_at: repo.pushed_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_wrapped_base64_readme() {
    let readme = ApiReadme {
      content: "IyBXaWRnZXQKCkEg\nc21hbGwgbGlicmFy\neS4K\n".to_string(),
      encoding: "base64".to_string(),
    };
    assert_eq!(readme.decode().unwrap(), "# Widget\n\nA small library.\n");
  }

  #[test]
  fn rejects_unknown_encoding_and_garbage() {
    let unknown = ApiReadme {
      content: "plain".to_string(),
      encoding: "utf-8".to_string(),
    };
    assert!(unknown.decode().is_err());

    let garbage = ApiReadme {
      content: "!!not base64!!".to_string(),
      encoding: "base64".to_string(),
    };
    assert!(garbage.decode().is_err());
  }

  #[test]
  fn commit_date_prefers_committer() {
    let commit: ApiCommit = serde_json::from_str(
      r#"{"commit":{"author":{"date":"2024-01-01T00:00:00Z"},"committer":{"date":"2024-02-01T00:00:00Z"}}}"#,
    )
    .unwrap();
    assert_eq!(commit.date().unwrap().to_rfc3339(), "2024-02-01T00:00:00+00:00");

    let author_only: ApiCommit =
      serde_json::from_str(r#"{"commit":{"author":{"date":"2024-01-01T00:00:00Z"},"committer":null}}"#)
        .unwrap();
    assert_eq!(author_only.date().unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
  }

  #[test]
  fn repository_maps_to_metadata() {
    let repo: ApiRepository = serde_json::from_str(
      r#"{
        "name": "widget",
        "full_name": "acme/widget",
        "owner": {"login": "acme"},
        "description": null,
        "html_url": "https://github.com/acme/widget",
        "homepage": "",
        "language": "Rust",
        "license": {"name": "MIT License", "spdx_id": "MIT"},
        "default_branch": "main",
        "stargazers_count": 12,
        "forks_count": 3,
        "open_issues_count": 1,
        "subscribers_count": 4,
        "pushed_at": "2024-03-01T10:00:00Z"
      }"#,
    )
    .unwrap();

    let meta = RepoMetadata::from(repo);
    assert_eq!(meta.full_name, "acme/widget");
    assert_eq!(meta.homepage, None);
    assert_eq!(meta.license.as_deref(), Some("MIT License"));
    assert_eq!(meta.stars, 12);
    assert_eq!(meta.watchers, 4);
    assert!(meta.topics.is_empty());
  }
}
