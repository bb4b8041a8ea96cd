use crate::error::{FetchError, Result};
use crate::fetcher::{FetchRequest, TreeFetcher};
use async_trait::async_trait;
use relay_protocol::{DesignNode, Snapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serves snapshots from memory, honoring `node_id` and `depth` the way the upstream does.
/// Used for offline replays and tests.
#[derive(Default, Clone)]
pub struct StaticTreeFetcher {
    trees: HashMap<String, Arc<Snapshot>>,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StaticTreeFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.trees
            .insert(snapshot.tree_id.clone(), Arc::new(snapshot));
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `fetch` calls served so far (including failed ones).
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeFetcher for StaticTreeFetcher {
    async fn fetch(&self, request: &FetchRequest, _token: &str) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let snapshot = self
            .trees
            .get(&request.tree_id)
            .ok_or_else(|| FetchError::NotFound(format!("tree {}", request.tree_id)))?;

        let node = match &request.node_id {
            Some(id) => find_node(&snapshot.root, id.as_str())
                .ok_or_else(|| FetchError::NotFound(format!("node {id}")))?,
            None => &snapshot.root,
        };

        let root = match request.depth {
            Some(depth) => node.pruned(depth),
            None => node.clone(),
        };
        Ok(Snapshot::new(
            snapshot.tree_id.clone(),
            root,
            snapshot.fetched_at_unix_ms,
        ))
    }
}

fn find_node<'a>(root: &'a DesignNode, id: &str) -> Option<&'a DesignNode> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.id.as_str() == id {
            return Some(node);
        }
        stack.extend(node.children.iter().rev());
    }
    None
}
