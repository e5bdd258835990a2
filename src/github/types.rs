use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository metadata from the primary API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMetadata {
  pub full_name: String,
  pub owner: String,
  pub name: String,
  pub description: Option<String>,
  pub html_url: String,
  pub homepage: Option<String>,
  pub language: Option<String>,
  #[serde(default)]
  pub topics: Vec<String>,
  pub license: Option<String>,
  pub default_branch: String,
  pub stars: u64,
  pub forks: u64,
  pub open_issues: u64,
  pub watchers: u64,
  pub archived: bool,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
  pub pushed_at: Option<DateTime<Utc>>,
}

/// Everything fetched for one repository. This is the cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSnapshot {
  pub metadata: RepoMetadata,
  /// Decoded README text, absent if the README call failed
  pub readme: Option<String>,
  /// Latest commit time, or `pushed_at` when the commits call failed
  pub last_activity: Option<DateTime<Utc>>,
}

/// README projection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoReadme {
  pub full_name: String,
  pub readme: Option<String>,
}

/// Stats projection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoStats {
  pub full_name: String,
  pub stars: u64,
  pub forks: u64,
  pub open_issues: u64,
  pub watchers: u64,
  pub last_activity: Option<DateTime<Utc>>,
}

impl RepoSnapshot {
  pub fn readme_view(&self) -> RepoReadme {
    RepoReadme {
      full_name: self.metadata.full_name.clone(),
      readme: self.readme.clone(),
    }
  }

  pub fn stats_view(&self) -> RepoStats {
    let m = &self.metadata;
    RepoStats {
      full_name: m.full_name.clone(),
      stars: m.stars,
      forks: m.forks,
      open_issues: m.open_issues,
      watchers: m.watchers,
      last_activity: self.last_activity,
    }
  }
}
