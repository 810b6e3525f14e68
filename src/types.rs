use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// One successful workflow run on the tracked branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentEvent {
    pub run_id: u64,
    pub commit_sha: String,
    pub created_at: DateTime<Utc>,
}

/// A pull request associated with a deployed commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequestLink {
    pub number: u64,
    /// `None` when the pull request is unmerged or merge info is unavailable.
    pub merged_at: Option<DateTime<Utc>>,
}

/// The result of one collection run, as persisted on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub deployment_frequency: usize,
    pub average_lead_time_hours: f64,
}

impl MetricsSnapshot {
    /// Builds a snapshot stamped at `now`, truncated to whole seconds.
    pub fn new(
        now: DateTime<Utc>,
        deployment_frequency: usize,
        average_lead_time_hours: f64,
    ) -> Self {
        Self {
            timestamp: now.trunc_subsecs(0),
            deployment_frequency,
            average_lead_time_hours,
        }
    }
}
