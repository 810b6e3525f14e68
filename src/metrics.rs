use crate::github::PullRequestLookup;
use crate::types::{DeploymentEvent, PullRequestLink};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Counts deployments created strictly after `now - window`.
///
/// `now` is captured once by the caller so every comparison uses the same boundary. A
/// window reaching past the earliest representable time counts every deployment.
pub fn deployment_frequency(
    deployments: &[DeploymentEvent],
    now: DateTime<Utc>,
    window: Duration,
) -> usize {
    let window_start = now
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    deployments
        .iter()
        .filter(|d| d.created_at > window_start)
        .count()
}

/// Picks the pull request a commit is attributed to: the first one the API returned.
///
/// A commit can be referenced by several pull requests (cherry-picks, squash merges into
/// multiple branches). Only the first is considered; the others are ignored.
pub fn select_primary_pull_request(prs: Vec<PullRequestLink>) -> Option<PullRequestLink> {
    prs.into_iter().next()
}

/// Hours from merge to deployment. Negative when the deployment predates the recorded
/// merge; such samples are kept.
pub fn lead_time_hours(deployment: &DeploymentEvent, pr: &PullRequestLink) -> Option<f64> {
    let merged_at = pr.merged_at?;
    Some((deployment.created_at - merged_at).num_seconds() as f64 / SECONDS_PER_HOUR)
}

/// Arithmetic mean rounded to two decimals; `0.0` for no samples.
pub fn average_hours(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    round_hundredths(mean)
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Resolves each deployment to its primary pull request and returns the lead-time
/// samples, in deployment order.
///
/// At most `concurrency_limit` lookups are in flight. A failed or empty lookup, or an
/// unmerged pull request, skips that deployment only.
pub async fn collect_lead_time_samples<L: PullRequestLookup>(
    deployments: &[DeploymentEvent],
    lookup: Arc<L>,
    concurrency_limit: usize,
) -> Vec<f64> {
    stream::iter(deployments.to_vec())
        .map(move |deployment| {
            let lookup = Arc::clone(&lookup);
            async move { lead_time_sample(&deployment, lookup.as_ref()).await }
        })
        .buffered(concurrency_limit.max(1))
        .filter_map(|sample| async move { sample })
        .collect()
        .await
}

async fn lead_time_sample<L: PullRequestLookup>(
    deployment: &DeploymentEvent,
    lookup: &L,
) -> Option<f64> {
    let prs = match lookup.pull_requests_for_commit(&deployment.commit_sha).await {
        Ok(prs) => prs,
        Err(e) => {
            tracing::warn!(
                sha = %deployment.commit_sha,
                run_id = deployment.run_id,
                "Skipping lead time sample, pull request lookup failed: {:#}",
                e
            );
            return None;
        }
    };

    let Some(pr) = select_primary_pull_request(prs) else {
        tracing::debug!(sha = %deployment.commit_sha, "No pull request for commit");
        return None;
    };

    let sample = lead_time_hours(deployment, &pr);
    if sample.is_none() {
        tracing::debug!(
            sha = %deployment.commit_sha,
            pr = pr.number,
            "Pull request not merged"
        );
    }
    sample
}

/// Average lead time in hours over all resolvable deployments.
pub async fn average_lead_time<L: PullRequestLookup>(
    deployments: &[DeploymentEvent],
    lookup: Arc<L>,
    concurrency_limit: usize,
) -> f64 {
    let samples = collect_lead_time_samples(deployments, lookup, concurrency_limit).await;
    tracing::debug!(
        deployments = deployments.len(),
        samples = samples.len(),
        "Collected lead time samples"
    );
    average_hours(&samples)
}
