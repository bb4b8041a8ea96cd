use crate::error::{FetchError, Result};
use async_trait::async_trait;
use relay_protocol::{NodeId, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// What to fetch: a whole tree, or the subtree under one node, optionally cut at `depth`
/// levels below the requested node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchRequest {
    pub tree_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

impl FetchRequest {
    pub fn tree(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            node_id: None,
            depth: None,
        }
    }

    #[must_use]
    pub fn node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    #[must_use]
    pub fn node_opt(mut self, node_id: Option<NodeId>) -> Self {
        self.node_id = node_id;
        self
    }

    #[must_use]
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// The upstream tree source. Implementations own transport and authentication.
#[async_trait]
pub trait TreeFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest, token: &str) -> Result<Snapshot>;
}

#[async_trait]
impl<T: TreeFetcher + ?Sized> TreeFetcher for Arc<T> {
    async fn fetch(&self, request: &FetchRequest, token: &str) -> Result<Snapshot> {
        (**self).fetch(request, token).await
    }
}

/// Bounded retry schedule for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts are 1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32, error: &FetchError) -> Duration {
        if let FetchError::RateLimited {
            retry_after_ms: Some(ms),
        } = error
        {
            return Duration::from_millis(*ms).min(self.max_delay);
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Retries transient failures of the wrapped fetcher. Retrying happens only here; callers
/// above this boundary treat any error as final.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: TreeFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: TreeFetcher> TreeFetcher for RetryingFetcher<F> {
    async fn fetch(&self, request: &FetchRequest, token: &str) -> Result<Snapshot> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match self.inner.fetch(request, token).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt, &err);
                    log::warn!(
                        "fetch {} attempt {attempt}/{max_attempts} failed: {err}; retrying in {delay:?}",
                        request.tree_id
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
