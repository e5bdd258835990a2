use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use repo_cache::cache::{CacheStore, SqliteStore};
use repo_cache::clock::{Clock, SystemClock};
use repo_cache::config::Config;
use repo_cache::github::{GitHubClient, RepoId, RepoSnapshot, ReqwestTransport};
use repo_cache::limiter::{Caller, Tier};
use repo_cache::{ResourceService, TierLimits};

#[derive(Parser, Debug)]
#[command(name = "repo-cache")]
#[command(about = "Cached, rate-limited access to GitHub repository metadata")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/repo-cache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Look up a repository, fetching from GitHub when the cache is stale
  Lookup {
    /// Repository reference, e.g. acme/widget or https://github.com/acme/widget
    identifier: String,

    /// Which projection to print
    #[arg(long, value_enum, default_value_t = View::Full)]
    view: View,

    /// Caller identity charged against the rate limit
    #[arg(long, default_value = Caller::ANONYMOUS)]
    identity: String,

    /// Rate limit tier of the caller
    #[arg(long, value_enum, default_value_t = Tier::General)]
    tier: Tier,
  },
  /// Print the stored cache entry for a repository without fetching
  Inspect {
    identifier: String,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum View {
  Full,
  Readme,
  Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repo_cache=info")),
    )
    .with_writer(writer)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let clock: Arc<dyn Clock> = Arc::new(SystemClock);
  let store = Arc::new(SqliteStore::open(
    config.cache.path.as_deref(),
    Arc::clone(&clock),
  )?);

  match args.command {
    Command::Lookup {
      identifier,
      view,
      identity,
      tier,
    } => {
      let token = Config::get_api_token();
      if token.is_none() {
        tracing::info!("no GitHub token configured; using anonymous quota");
      }
      let transport = ReqwestTransport::new(&config.github, token.as_deref())?;
      let client = GitHubClient::new(transport, config.github.backoff.policy(token.is_some()))
        .with_call_timeout(config.github.timeout());

      let service = ResourceService::new(
        store,
        client,
        clock,
        TierLimits::from(&config),
        config.cache.ttl(),
      );
      service
        .start_housekeeping(config.rate_limits.sweep_interval())
        .await;

      let caller = Caller::new(identity, tier);
      let outcome = lookup(&service, &caller, &identifier, view).await;
      service.shutdown().await;
      println!("{}", outcome?);
    }
    Command::Inspect { identifier } => {
      let repo = RepoId::parse(&identifier)?;
      let entry = store
        .get::<RepoSnapshot>(&repo.cache_key())?
        .ok_or_else(|| eyre!("No cache entry for {}", repo.cache_key()))?;

      let status = if entry.is_fresh(clock.now()) {
        "fresh"
      } else {
        "expired"
      };
      eprintln!(
        "{} ({}): fetched {}, expires {}",
        entry.resource_key, status, entry.fetched_at, entry.expires_at
      );
      println!("{}", serde_json::to_string_pretty(&entry.payload)?);
    }
  }

  Ok(())
}

async fn lookup(
  service: &ResourceService<SqliteStore, ReqwestTransport>,
  caller: &Caller,
  identifier: &str,
  view: View,
) -> Result<String> {
  let (json, source) = match view {
    View::Full => {
      let result = service.repository(caller, identifier).await?;
      (serde_json::to_string_pretty(result.data.as_ref())?, result.source)
    }
    View::Readme => {
      let result = service.readme(caller, identifier).await?;
      (serde_json::to_string_pretty(&result.data)?, result.source)
    }
    View::Stats => {
      let result = service.stats(caller, identifier).await?;
      (serde_json::to_string_pretty(&result.data)?, result.source)
    }
  };
  eprintln!("source: {}", source);
  Ok(json)
}
