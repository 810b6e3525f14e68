//! Application configuration and environment variable parsing.
//!
//! Settings are read once at process start from `DORA_`-prefixed environment variables
//! (optionally via a `.env` file) into an `AppConfig`, which is then passed explicitly to
//! the fetcher, the aggregator and the snapshot writer. The GitHub credential is looked up
//! separately because its variable names are fixed by the CI secrets that provide it.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

/// Environment variables holding the GitHub token, in lookup order.
pub const TOKEN_VARS: [&str; 2] = ["GH_PAT", "GH_TOKEN"];

/// The GitHub API never returns more than 100 items per page.
pub const MAX_PAGE_SIZE: u8 = 100;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl RepoId {
    /// Parses an `owner/repo` string. Path traversal sequences are stripped.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, repo) = s.trim().split_once('/')?;
        let owner = owner.trim().replace("..", "");
        let repo = repo.trim().replace("..", "");
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self { owner, repo })
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// How a new snapshot is written to the output file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Replace the file with the single latest snapshot.
    Overwrite,
    /// Append the snapshot to the JSON array already in the file.
    #[default]
    Append,
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Repository to measure, as `owner/repo`.
    #[serde(deserialize_with = "deserialize_repo_id")]
    pub repository: RepoId,

    /// Branch whose workflow runs count as deployments.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Where snapshots are persisted.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default)]
    pub persistence_mode: PersistenceMode,

    /// Number of most recent workflow runs inspected. Only the first page is fetched, so
    /// older runs are invisible to every metric.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Size of the trailing window for deployment frequency.
    #[serde(default = "default_frequency_window_days")]
    pub frequency_window_days: i64,

    /// Maximum number of pull-request lookups in flight at once.
    #[serde(default = "default_lookup_concurrency_limit")]
    pub lookup_concurrency_limit: usize,

    /// Connect and read timeout applied to every GitHub request.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Alternative API root, for GitHub Enterprise.
    pub api_base_url: Option<String>,

    /// Static files served next to the read API.
    #[serde(default = "default_dashboard_dir")]
    pub dashboard_dir: PathBuf,

    /// When set, `serve` re-collects metrics on this interval.
    pub refresh_interval_seconds: Option<u64>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("dora_metrics.json")
}

fn default_page_size() -> u32 {
    u32::from(MAX_PAGE_SIZE)
}

fn default_frequency_window_days() -> i64 {
    7
}

fn default_lookup_concurrency_limit() -> usize {
    10
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_dashboard_dir() -> PathBuf {
    PathBuf::from("dashboard")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        let config: Self = envy::prefixed("DORA_").from_env()?;
        config.frequency_window()?;
        Ok(config)
    }

    /// Builds a configuration with defaults for everything but the repository.
    pub fn for_repository(repository: RepoId) -> Self {
        Self {
            repository,
            branch: default_branch(),
            output_path: default_output_path(),
            persistence_mode: PersistenceMode::default(),
            page_size: default_page_size(),
            frequency_window_days: default_frequency_window_days(),
            lookup_concurrency_limit: default_lookup_concurrency_limit(),
            request_timeout_seconds: default_request_timeout_seconds(),
            api_base_url: None,
            dashboard_dir: default_dashboard_dir(),
            refresh_interval_seconds: None,
        }
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_seconds)
    }

    /// The trailing frequency window; must be a positive, representable number of days.
    pub fn frequency_window(&self) -> Result<TimeDelta, envy::Error> {
        TimeDelta::try_days(self.frequency_window_days)
            .filter(|window| *window > TimeDelta::zero())
            .ok_or_else(|| {
                envy::Error::Custom(format!(
                    "frequency window must be a positive number of days, got {}",
                    self.frequency_window_days
                ))
            })
    }

    pub fn effective_page_size(&self) -> u8 {
        u8::try_from(self.page_size.clamp(1, u32::from(MAX_PAGE_SIZE))).unwrap_or(MAX_PAGE_SIZE)
    }

    pub fn refresh_interval(&self) -> Option<StdDuration> {
        self.refresh_interval_seconds
            .filter(|secs| *secs > 0)
            .map(StdDuration::from_secs)
    }
}

fn deserialize_repo_id<'de, D>(deserializer: D) -> Result<RepoId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    RepoId::parse(&s).ok_or_else(|| {
        serde::de::Error::custom(format!("expected repository as owner/repo, got '{s}'"))
    })
}

/// Returns the first non-blank token among [`TOKEN_VARS`].
pub fn resolve_token<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    TOKEN_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Reads the GitHub token from the process environment.
pub fn token_from_env() -> Option<String> {
    resolve_token(|name| std::env::var(name).ok())
}
