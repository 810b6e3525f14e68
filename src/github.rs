//! GitHub REST access: the deployment fetcher and per-commit pull-request lookups.
//!
//! Only the response fields the metrics consume are deserialized, so schema drift in the
//! rest of the payload never breaks a run.

use crate::config::{AppConfig, RepoId};
use crate::error::{DoraError, Result};
use crate::types::{DeploymentEvent, PullRequestLink};
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Workflow-run conclusion that marks a deployment.
pub const SUCCESS_CONCLUSION: &str = "success";

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    conclusion: Option<String>,
    head_sha: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AssociatedPullRequest {
    number: u64,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct RunsQuery<'a> {
    branch: &'a str,
    per_page: u8,
}

/// Resolves a commit to the pull requests that introduced it.
///
/// Lookups are shared across concurrently polled futures and may run inside spawned
/// tasks, so implementations must be `Send + Sync` and return `Send` futures.
pub trait PullRequestLookup: Send + Sync {
    fn pull_requests_for_commit(
        &self,
        sha: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<PullRequestLink>>> + Send;
}

#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    pub fn new(token: String, config: &AppConfig) -> Result<Self> {
        let timeout = Some(config.request_timeout());
        let mut builder = Octocrab::builder()
            .personal_token(token)
            .set_connect_timeout(timeout)
            .set_read_timeout(timeout);
        if let Some(base_url) = &config.api_base_url {
            builder = builder.base_uri(base_url.as_str())?;
        }

        Ok(Self {
            octocrab: builder.build()?,
        })
    }

    /// Returns the successful workflow runs on `branch`, most recent first.
    ///
    /// Only the first page of at most `page_size` runs is inspected. A failed request is an
    /// error, never an empty list.
    pub async fn fetch_deployments(
        &self,
        repo_id: &RepoId,
        branch: &str,
        page_size: u8,
    ) -> Result<Vec<DeploymentEvent>> {
        let route = format!("/repos/{}/{}/actions/runs", repo_id.owner, repo_id.repo);
        let query = RunsQuery {
            branch,
            per_page: page_size,
        };

        let page: WorkflowRunsPage = match self.octocrab.get(route, Some(&query)).await {
            Ok(page) => page,
            Err(e) => {
                let err = DoraError::from(e);
                if let DoraError::Api { status, message } = &err {
                    tracing::error!(
                        repo = %repo_id,
                        branch,
                        status,
                        body = %message,
                        "Workflow runs request rejected"
                    );
                } else {
                    tracing::error!(repo = %repo_id, branch, "Workflow runs request failed: {err}");
                }
                return Err(err);
            }
        };

        let total = page.workflow_runs.len();
        let deployments: Vec<DeploymentEvent> = page
            .workflow_runs
            .into_iter()
            .filter(|run| run.conclusion.as_deref() == Some(SUCCESS_CONCLUSION))
            .map(|run| DeploymentEvent {
                run_id: run.id,
                commit_sha: run.head_sha,
                created_at: run.created_at,
            })
            .collect();

        tracing::info!(
            repo = %repo_id,
            branch,
            runs = total,
            deployments = deployments.len(),
            "Fetched workflow runs"
        );
        if total >= usize::from(page_size) {
            tracing::warn!(
                "Run page for {} is full ({}); older deployments are not counted.",
                repo_id,
                page_size
            );
        }

        Ok(deployments)
    }

    /// Pull-request lookups scoped to one repository.
    pub fn pull_requests(&self, repo_id: &RepoId) -> RepoPullRequests {
        RepoPullRequests {
            client: self.clone(),
            repo_id: repo_id.clone(),
        }
    }
}

pub struct RepoPullRequests {
    client: GitHubClient,
    repo_id: RepoId,
}

impl PullRequestLookup for RepoPullRequests {
    async fn pull_requests_for_commit(&self, sha: &str) -> anyhow::Result<Vec<PullRequestLink>> {
        let route = format!(
            "/repos/{}/{}/commits/{}/pulls",
            self.repo_id.owner, self.repo_id.repo, sha
        );
        let prs: Vec<AssociatedPullRequest> = self
            .client
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(DoraError::from)?;

        Ok(prs
            .into_iter()
            .map(|pr| PullRequestLink {
                number: pr.number,
                merged_at: pr.merged_at,
            })
            .collect())
    }
}
