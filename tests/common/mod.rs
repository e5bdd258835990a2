#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use repo_cache::cache::SqliteStore;
use repo_cache::clock::ManualClock;
use repo_cache::github::{BackoffPolicy, GitHubClient, HttpResponse, Transport};
use repo_cache::limiter::TierLimit;
use repo_cache::{ResourceService, TierLimits};

pub const METADATA: &str = "/repos/acme/widget";
pub const README: &str = "/repos/acme/widget/readme";
pub const COMMITS: &str = "/repos/acme/widget/commits?per_page=1";

/// What the fake upstream does for one call.
#[derive(Debug, Clone)]
pub enum Reply {
  Status(u16, String),
  /// Transport-level failure (connection reset, DNS, ...)
  Fail(String),
  /// Answer after a delay
  Slow(Duration, u16, String),
}

#[derive(Default)]
struct Inner {
  routes: Mutex<HashMap<String, VecDeque<Reply>>>,
  calls: Mutex<Vec<String>>,
}

/// Scripted upstream. Each path has a queue of replies; the last reply for a
/// path repeats once the queue is down to one. Unscripted paths answer 404.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
  inner: Arc<Inner>,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the replies for `path`.
  pub fn script(&self, path: &str, replies: Vec<Reply>) {
    self
      .inner
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), replies.into());
  }

  pub fn ok(&self, path: &str, body: impl Into<String>) {
    self.script(path, vec![Reply::Status(200, body.into())]);
  }

  pub fn calls(&self) -> Vec<String> {
    self.inner.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, path: &str) -> usize {
    self.calls().iter().filter(|p| p.as_str() == path).count()
  }

  fn next_reply(&self, path: &str) -> Reply {
    let mut routes = self.inner.routes.lock().unwrap();
    match routes.get_mut(path) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
      Some(queue) if !queue.is_empty() => queue[0].clone(),
      _ => Reply::Status(404, r#"{"message":"Not Found"}"#.to_string()),
    }
  }
}

impl Transport for ScriptedTransport {
  async fn get(&self, path: &str) -> Result<HttpResponse> {
    self.inner.calls.lock().unwrap().push(path.to_string());
    match self.next_reply(path) {
      Reply::Status(status, body) => Ok(HttpResponse { status, body }),
      Reply::Fail(message) => Err(eyre!("{}", message)),
      Reply::Slow(delay, status, body) => {
        tokio::time::sleep(delay).await;
        Ok(HttpResponse { status, body })
      }
    }
  }
}

pub fn repo_json(stars: u64) -> String {
  serde_json::json!({
    "name": "widget",
    "full_name": "acme/widget",
    "owner": { "login": "acme" },
    "description": "A widget",
    "html_url": "https://github.com/acme/widget",
    "homepage": null,
    "language": "Rust",
    "topics": ["widgets"],
    "license": { "name": "MIT License", "spdx_id": "MIT" },
    "default_branch": "main",
    "stargazers_count": stars,
    "forks_count": 2,
    "open_issues_count": 5,
    "subscribers_count": 3,
    "archived": false,
    "created_at": "2020-01-01T00:00:00Z",
    "updated_at": "2024-05-01T00:00:00Z",
    "pushed_at": "2024-04-01T00:00:00Z"
  })
  .to_string()
}

pub fn readme_json(text: &str) -> String {
  let encoded = STANDARD.encode(text);
  // GitHub wraps the payload at 60 columns
  let wrapped: Vec<String> = encoded
    .as_bytes()
    .chunks(60)
    .map(|c| String::from_utf8_lossy(c).into_owned())
    .collect();
  serde_json::json!({
    "name": "README.md",
    "encoding": "base64",
    "content": wrapped.join("\n"),
  })
  .to_string()
}

pub fn commits_json(date: &str) -> String {
  serde_json::json!([
    { "sha": "abc123", "commit": { "author": { "date": date }, "committer": { "date": date } } }
  ])
  .to_string()
}

/// Script a complete, successful fetch for acme/widget.
pub fn script_success(transport: &ScriptedTransport, stars: u64) {
  transport.ok(METADATA, repo_json(stars));
  transport.ok(README, readme_json("# Widget\n"));
  transport.ok(COMMITS, commits_json("2024-06-01T12:00:00Z"));
}

pub type TestService = ResourceService<SqliteStore, ScriptedTransport>;

pub struct Harness {
  pub clock: Arc<ManualClock>,
  pub store: Arc<SqliteStore>,
  pub transport: ScriptedTransport,
  pub service: TestService,
}

pub fn limits(limit: u32) -> TierLimits {
  let tier = TierLimit {
    limit,
    window: chrono::Duration::minutes(15),
  };
  TierLimits {
    general: tier,
    authenticated: tier,
    privileged: tier,
  }
}

pub fn harness() -> Harness {
  harness_with_limits(limits(1000))
}

pub fn harness_with_limits(limits: TierLimits) -> Harness {
  let clock = Arc::new(ManualClock::default());
  let store = Arc::new(SqliteStore::open_in_memory(clock.clone()).unwrap());
  let transport = ScriptedTransport::new();
  let client = GitHubClient::new(transport.clone(), BackoffPolicy::none())
    .with_call_timeout(Duration::from_millis(200));
  let service = ResourceService::new(
    Arc::clone(&store),
    client,
    clock.clone(),
    limits,
    chrono::Duration::hours(6),
  );
  Harness {
    clock,
    store,
    transport,
    service,
  }
}
