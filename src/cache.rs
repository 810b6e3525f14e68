use crate::github::PullRequestLookup;
use crate::types::PullRequestLink;
use moka::future::Cache;

/// Upper bound on distinct commits remembered during one run. A run never inspects more
/// than one page of workflow runs, so this is never reached in practice.
const MAX_CACHED_COMMITS: u64 = 1_000;

/// Memoises commit → pull-request lookups for the lifetime of a run.
///
/// Several workflows usually succeed for the same commit, so the deployment list repeats
/// SHAs. Concurrent lookups for one SHA are coalesced into a single request. Failures are
/// not cached.
pub struct CachedPullRequestLookup<L> {
    inner: L,
    cache: Cache<String, Vec<PullRequestLink>>,
}

impl<L: PullRequestLookup> CachedPullRequestLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(MAX_CACHED_COMMITS).build(),
        }
    }
}

impl<L: PullRequestLookup> PullRequestLookup for CachedPullRequestLookup<L> {
    async fn pull_requests_for_commit(&self, sha: &str) -> anyhow::Result<Vec<PullRequestLink>> {
        self.cache
            .try_get_with(sha.to_string(), self.inner.pull_requests_for_commit(sha))
            .await
            .map_err(|e| anyhow::anyhow!("{e:#}"))
    }
}
