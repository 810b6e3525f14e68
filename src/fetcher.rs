use crate::cache::CachedPullRequestLookup;
use crate::config::AppConfig;
use crate::error::Result;
use crate::github::GitHubClient;
use crate::history;
use crate::metrics;
use crate::types::MetricsSnapshot;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;

/// Fetches deployments from GitHub and computes both metrics.
///
/// `now` is the single reference time for the frequency window and the snapshot stamp.
pub async fn collect_metrics(
    client: &GitHubClient,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<MetricsSnapshot> {
    let window = config.frequency_window()?;

    let deployments = client
        .fetch_deployments(
            &config.repository,
            &config.branch,
            config.effective_page_size(),
        )
        .await?;

    let frequency = metrics::deployment_frequency(&deployments, now, window);

    let lookup = Arc::new(CachedPullRequestLookup::new(
        client.pull_requests(&config.repository),
    ));
    let lead_time =
        metrics::average_lead_time(&deployments, lookup, config.lookup_concurrency_limit).await;

    Ok(MetricsSnapshot::new(now, frequency, lead_time))
}

/// Collects a snapshot and persists it with the configured mode.
pub async fn collect_and_persist(
    client: &GitHubClient,
    config: &AppConfig,
) -> Result<MetricsSnapshot> {
    let snapshot = collect_metrics(client, config, Utc::now()).await?;
    history::persist_snapshot(&config.output_path, &snapshot, config.persistence_mode)?;
    Ok(snapshot)
}

/// Starts a task that re-collects metrics every `interval`.
///
/// A failed collection is logged and retried at the next tick.
pub fn start_background_refresh(
    client: GitHubClient,
    config: AppConfig,
    interval: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(repo = %config.repository, ?interval, "Starting background metrics refresh");
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            match collect_and_persist(&client, &config).await {
                Ok(snapshot) => tracing::info!(
                    repo = %config.repository,
                    deployment_frequency = snapshot.deployment_frequency,
                    average_lead_time_hours = snapshot.average_lead_time_hours,
                    "Refreshed metrics"
                ),
                Err(e) => {
                    tracing::error!("Failed to refresh metrics for {}: {}", config.repository, e)
                }
            }
        }
    })
}
