use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::future::Future;
use std::time::Duration;

use super::api_types::{ApiCommit, ApiReadme, ApiRepository};
use super::backoff::BackoffPolicy;
use super::error::FetchError;
use super::identifier::RepoId;
use super::types::{RepoMetadata, RepoSnapshot};
use crate::config::GithubConfig;

/// Status and body of an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Outbound HTTP seam. `path` is relative to the API base, e.g. `/repos/acme/widget`.
///
/// Errors are transport failures only; non-2xx statuses are returned as responses.
pub trait Transport: Send + Sync + 'static {
  fn get(&self, path: &str) -> impl Future<Output = Result<HttpResponse>> + Send;
}

/// reqwest-backed transport for api.github.com (or a compatible base URL).
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
  base_url: String,
}

impl ReqwestTransport {
  pub fn new(config: &GithubConfig, token: Option<&str>) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(
      ACCEPT,
      HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
    if let Some(token) = token {
      let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("GitHub token is not a valid header value: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .user_agent(config.user_agent.as_str())
      .default_headers(headers)
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.api_url.trim_end_matches('/').to_string(),
    })
  }
}

impl Transport for ReqwestTransport {
  async fn get(&self, path: &str) -> Result<HttpResponse> {
    let url = format!("{}{}", self.base_url, path);
    let response = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| eyre!("GET {} failed: {}", url, e))?;

    let status = response.status().as_u16();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?;

    Ok(HttpResponse { status, body })
  }
}

/// GitHub repository client.
///
/// One fetch is three sequential calls: repository metadata (required), README
/// and latest commit (both optional, tolerated on failure).
pub struct GitHubClient<T> {
  transport: T,
  backoff: BackoffPolicy,
  call_timeout: Duration,
}

impl<T: Transport> GitHubClient<T> {
  pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

  pub fn new(transport: T, backoff: BackoffPolicy) -> Self {
    Self {
      transport,
      backoff,
      call_timeout: Self::DEFAULT_CALL_TIMEOUT,
    }
  }

  pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
    self.call_timeout = timeout;
    self
  }

  pub fn backoff(&self) -> &BackoffPolicy {
    &self.backoff
  }

  /// Parse `identifier` and fetch the repository.
  pub async fn fetch(&self, identifier: &str) -> std::result::Result<RepoSnapshot, FetchError> {
    let repo = RepoId::parse(identifier)?;
    self.fetch_repo(&repo).await
  }

  /// Fetch metadata, README and latest activity for `repo`.
  pub async fn fetch_repo(&self, repo: &RepoId) -> std::result::Result<RepoSnapshot, FetchError> {
    let started = std::time::Instant::now();
    let metadata = self.get_metadata(repo).await?;

    self.backoff.wait(1).await;
    let readme = self.get_readme(repo).await;

    self.backoff.wait(2).await;
    let last_activity = self.get_latest_commit_date(repo).await.or(metadata.pushed_at);

    tracing::info!(
      repo = %repo,
      has_readme = readme.is_some(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "fetched repository"
    );

    Ok(RepoSnapshot {
      metadata,
      readme,
      last_activity,
    })
  }

  /// One upstream call bounded by the call timeout.
  async fn call(&self, path: &str) -> std::result::Result<HttpResponse, FetchError> {
    match tokio::time::timeout(self.call_timeout, self.transport.get(path)).await {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(e)) => Err(FetchError::Upstream(format!("{:#}", e))),
      Err(_) => Err(FetchError::Upstream(format!(
        "GET {} timed out after {:?}",
        path, self.call_timeout
      ))),
    }
  }

  async fn get_metadata(&self, repo: &RepoId) -> std::result::Result<RepoMetadata, FetchError> {
    let response = self.call(&repo.api_path()).await?;
    if !response.is_success() {
      let error = FetchError::from_status(response.status, &response.body);
      tracing::debug!(repo = %repo, status = response.status, error = %error, "metadata call failed");
      return Err(error);
    }

    let api: ApiRepository = serde_json::from_str(&response.body)
      .map_err(|e| FetchError::Upstream(format!("Failed to parse repository {}: {}", repo, e)))?;
    Ok(api.into())
  }

  async fn get_readme(&self, repo: &RepoId) -> Option<String> {
    let path = format!("{}/readme", repo.api_path());
    let outcome = match self.call(&path).await {
      Ok(response) if response.is_success() => serde_json::from_str::<ApiReadme>(&response.body)
        .map_err(|e| e.to_string())
        .and_then(|readme| readme.decode()),
      Ok(response) => Err(format!("HTTP {}", response.status)),
      Err(e) => Err(e.to_string()),
    };

    match outcome {
      Ok(text) => Some(text),
      Err(error) => {
        tracing::debug!(repo = %repo, %error, "readme unavailable");
        None
      }
    }
  }

  async fn get_latest_commit_date(&self, repo: &RepoId) -> Option<chrono::DateTime<chrono::Utc>> {
    let path = format!("{}/commits?per_page=1", repo.api_path());
    let outcome = match self.call(&path).await {
      Ok(response) if response.is_success() => {
        serde_json::from_str::<Vec<ApiCommit>>(&response.body).map_err(|e| e.to_string())
      }
      Ok(response) => Err(format!("HTTP {}", response.status)),
      Err(e) => Err(e.to_string()),
    };

    match outcome {
      Ok(commits) => commits.first().and_then(ApiCommit::date),
      Err(error) => {
        tracing::debug!(repo = %repo, %error, "latest commit unavailable; using pushed_at");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Answers every call with the same response.
  struct Fixed(u16, &'static str);

  impl Transport for Fixed {
    async fn get(&self, _path: &str) -> Result<HttpResponse> {
      Ok(HttpResponse {
        status: self.0,
        body: self.1.to_string(),
      })
    }
  }

  #[tokio::test]
  async fn malformed_identifier_is_invalid_input() {
    let client = GitHubClient::new(Fixed(200, "{}"), BackoffPolicy::none());
    let err = client.fetch("not a repo").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidInput(_)));
  }

  #[tokio::test]
  async fn primary_status_is_classified() {
    for (status, expected) in [
      (403, FetchError::RateLimited { status: 403 }),
      (404, FetchError::NotFound),
    ] {
      let client = GitHubClient::new(Fixed(status, "{}"), BackoffPolicy::none());
      assert_eq!(client.fetch("acme/widget").await.unwrap_err(), expected);
    }

    let client = GitHubClient::new(Fixed(502, "bad gateway"), BackoffPolicy::none());
    assert!(matches!(
      client.fetch("acme/widget").await.unwrap_err(),
      FetchError::Upstream(_)
    ));
  }

  #[tokio::test]
  async fn undecodable_metadata_is_upstream_error() {
    let client = GitHubClient::new(Fixed(200, "<html>"), BackoffPolicy::none());
    assert!(matches!(
      client.fetch("acme/widget").await.unwrap_err(),
      FetchError::Upstream(_)
    ));
  }
}
