//! Exercises the GitHub client and collection pipeline against an in-process server that
//! answers the two REST endpoints used.

mod common;

use chrono::{TimeZone, Utc};
use common::fake_github;
use dora_metrics::{
    config::PersistenceMode,
    error::DoraError,
    fetcher,
    github::{GitHubClient, PullRequestLookup},
    history,
};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_fetch_deployments_keeps_successful_runs_in_order() {
    let (_, config) = fake_github().await;
    let client = GitHubClient::new("test-token".to_string(), &config).unwrap();

    let deployments = client
        .fetch_deployments(&config.repository, &config.branch, 100)
        .await
        .unwrap();

    let ids: Vec<u64> = deployments.iter().map(|d| d.run_id).collect();
    assert_eq!(ids, vec![6, 1, 3, 4]);
    assert_eq!(deployments[0].commit_sha, "aaa");
    assert_eq!(
        deployments[0].created_at,
        Utc.with_ymd_and_hms(2024, 6, 10, 11, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_fetch_failure_is_an_error_not_an_empty_list() {
    let (_, config) = fake_github().await;
    let client = GitHubClient::new("test-token".to_string(), &config).unwrap();

    let result = client
        .fetch_deployments(&config.repository, "no-such-branch", 100)
        .await;

    match result {
        Err(DoraError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pull_request_lookup() {
    let (_, config) = fake_github().await;
    let client = GitHubClient::new("test-token".to_string(), &config).unwrap();
    let lookup = client.pull_requests(&config.repository);

    let prs = lookup.pull_requests_for_commit("aaa").await.unwrap();
    assert_eq!(prs.len(), 2);
    assert_eq!(prs[0].number, 41);

    assert!(lookup.pull_requests_for_commit("bbb").await.unwrap().is_empty());
    assert!(lookup.pull_requests_for_commit("ccc").await.is_err());
}

#[tokio::test]
async fn test_collect_metrics_end_to_end() {
    let (state, config) = fake_github().await;
    let client = GitHubClient::new("test-token".to_string(), &config).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();

    let snapshot = fetcher::collect_metrics(&client, &config, now).await.unwrap();

    // Runs 6, 1 and 3 fall inside the trailing week; run 4 is stale.
    assert_eq!(snapshot.deployment_frequency, 3);
    // Both deployments of "aaa" resolve to PR 41: 3h and 2h. "bbb" has no PR and the
    // lookup for "ccc" fails, so neither contributes.
    assert_eq!(snapshot.average_lead_time_hours, 2.5);
    assert_eq!(snapshot.timestamp, now);
    // One lookup per distinct commit.
    assert_eq!(state.pull_lookups.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_collect_and_persist_appends() {
    let (_, mut config) = fake_github().await;
    let dir = tempfile::tempdir().unwrap();
    config.output_path = dir.path().join("dora_metrics.json");
    config.persistence_mode = PersistenceMode::Append;
    let client = GitHubClient::new("test-token".to_string(), &config).unwrap();

    fetcher::collect_and_persist(&client, &config).await.unwrap();
    fetcher::collect_and_persist(&client, &config).await.unwrap();

    let snapshots = history::read_snapshots(&config.output_path).unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1].average_lead_time_hours, 2.5);
}

#[tokio::test]
async fn test_background_refresh_keeps_appending() {
    let (_, mut config) = fake_github().await;
    let dir = tempfile::tempdir().unwrap();
    config.output_path = dir.path().join("dora_metrics.json");
    config.persistence_mode = PersistenceMode::Append;
    let client = GitHubClient::new("test-token".to_string(), &config).unwrap();
    let output_path = config.output_path.clone();

    let handle = fetcher::start_background_refresh(client, config, Duration::from_millis(100));

    let snapshots = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshots = history::read_snapshots(&output_path).unwrap();
            if snapshots.len() >= 2 {
                return snapshots;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("refresh task did not persist two snapshots in time");
    handle.abort();

    assert_eq!(snapshots[0].average_lead_time_hours, 2.5);
    assert!(snapshots[1].timestamp >= snapshots[0].timestamp);
}
