use crate::cancel::CancelToken;
use crate::error::{Result, StreamError};
use relay_protocol::{
    FlatTree, NodeEvent, RecursionLimits, Snapshot, TruncationReason,
};
use relay_upstream::{FetchRequest, TreeFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Where the streamer gets nodes from.
#[derive(Clone)]
pub enum TreeSource {
    /// A complete snapshot already in memory. Never fetches.
    Snapshot(Arc<Snapshot>),
    /// Incremental fetches of `depth_per_call` levels, starting at `request`.
    Fetcher {
        fetcher: Arc<dyn TreeFetcher>,
        request: FetchRequest,
        token: String,
    },
}

/// Lazy depth-first traversal yielding one [`NodeEvent`] per node.
///
/// Work is an explicit stack of `(slot, depth)` over a [`FlatTree`] arena, so tree depth only
/// costs heap. Nothing is fetched until the consumer asks for the next event.
pub struct RecursiveStreamer {
    source: TreeSource,
    limits: RecursionLimits,
    cancel: CancelToken,
    tree: FlatTree,
    stack: Vec<(usize, usize)>,
    emitted: usize,
    fetches: usize,
    deadline: Option<Instant>,
    started: bool,
    finished: bool,
}

impl RecursiveStreamer {
    pub fn new(source: TreeSource, limits: RecursionLimits) -> Result<Self> {
        limits.validate()?;
        Ok(Self {
            source,
            limits,
            cancel: CancelToken::new(),
            tree: FlatTree::default(),
            stack: Vec::new(),
            emitted: 0,
            fetches: 0,
            deadline: None,
            started: false,
            finished: false,
        })
    }

    pub fn from_snapshot(snapshot: Arc<Snapshot>, limits: RecursionLimits) -> Result<Self> {
        Self::new(TreeSource::Snapshot(snapshot), limits)
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn limits(&self) -> &RecursionLimits {
        &self.limits
    }

    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Upstream calls issued so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drops all progress; the next call to [`RecursiveStreamer::next`] starts at the root.
    pub fn restart(&mut self) {
        self.tree = FlatTree::default();
        self.stack.clear();
        self.emitted = 0;
        self.fetches = 0;
        self.deadline = None;
        self.started = false;
        self.finished = false;
    }

    /// Next event in depth-first, parent-before-children order, or `None` when done.
    ///
    /// An error ends the traversal.
    pub async fn next(&mut self) -> Option<Result<NodeEvent>> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            return Some(Err(self.fail(StreamError::Cancelled)));
        }
        if !self.started {
            if let Err(err) = self.start().await {
                return Some(Err(self.fail(err)));
            }
        }
        match self.step().await {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => Some(Err(self.fail(err))),
        }
    }

    /// Drains the traversal into a vector. Stops at the first error.
    pub async fn collect(mut self) -> Result<Vec<NodeEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event?);
        }
        Ok(events)
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        self.finished = true;
        self.stack.clear();
        err
    }

    async fn start(&mut self) -> Result<()> {
        self.started = true;
        self.deadline = self
            .limits
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        self.tree = match self.source.clone() {
            TreeSource::Snapshot(snapshot) => FlatTree::from_snapshot(&snapshot)?,
            TreeSource::Fetcher { request, .. } => {
                let levels = self.limits.depth_per_call;
                let request = request.depth(levels);
                match self.fetch(&request).await? {
                    Some(snapshot) => FlatTree::build_partial(&snapshot.root, levels)?,
                    None => return Err(StreamError::Timeout),
                }
            }
        };
        if !self.tree.is_empty() {
            self.stack.push((0, 0));
        }
        Ok(())
    }

    async fn step(&mut self) -> Result<Option<NodeEvent>> {
        let Some((slot, depth)) = self.stack.pop() else {
            return Ok(None);
        };

        let is_frontier = depth >= self.limits.max_depth;
        let mut timed_out = self.deadline_passed();

        if !is_frontier && !timed_out && !self.is_loaded(slot)? {
            timed_out = !self.expand(slot, depth).await?;
        }

        let node = self
            .tree
            .get(slot)
            .ok_or(relay_protocol::ProtocolError::SlotOutOfRange(slot))?;
        let child_count = node.children.len();
        let unexpanded = !node.children_loaded || child_count > 0;
        let mut event = NodeEvent::new(node.payload.clone(), depth, child_count);

        if is_frontier {
            event = event.frontier();
        } else if !timed_out {
            self.stack
                .extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        self.emitted += 1;

        let remaining = self.tree.len().saturating_sub(self.emitted);
        let more = !self.stack.is_empty() || (timed_out && !is_frontier && unexpanded);
        if timed_out && more {
            log::debug!(
                "traversal timed out after {} nodes ({remaining} known remaining)",
                self.emitted
            );
            event = event.truncate(TruncationReason::Timeout, remaining);
            self.finish_early();
        } else if self.emitted >= self.limits.max_nodes && more {
            log::debug!(
                "traversal hit max_nodes={} ({remaining} known remaining)",
                self.limits.max_nodes
            );
            event = event.truncate(TruncationReason::MaxNodes, remaining);
            self.finish_early();
        }
        Ok(Some(event))
    }

    fn finish_early(&mut self) {
        self.stack.clear();
        self.finished = true;
    }

    fn is_loaded(&self, slot: usize) -> Result<bool> {
        self.tree
            .get(slot)
            .map(|node| node.children_loaded)
            .ok_or(StreamError::Protocol(
                relay_protocol::ProtocolError::SlotOutOfRange(slot),
            ))
    }

    /// Fetches the children of `slot`. Returns `false` when the deadline cut the fetch short.
    async fn expand(&mut self, slot: usize, depth: usize) -> Result<bool> {
        let TreeSource::Fetcher { request, .. } = &self.source else {
            return Ok(true);
        };
        let Some(node) = self.tree.get(slot) else {
            return Err(relay_protocol::ProtocolError::SlotOutOfRange(slot).into());
        };

        // Never fetch below max_depth.
        let levels = self
            .limits
            .depth_per_call
            .min(self.limits.max_depth.saturating_sub(depth))
            .max(1);
        let request = FetchRequest::tree(request.tree_id.clone())
            .node(node.payload.id.clone())
            .depth(levels);

        match self.fetch(&request).await? {
            Some(snapshot) => {
                self.tree
                    .attach_children(slot, &snapshot.root.children, levels)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// One upstream call raced against cancellation and the deadline. `Ok(None)` means the
    /// deadline won.
    async fn fetch(&mut self, request: &FetchRequest) -> Result<Option<Snapshot>> {
        let TreeSource::Fetcher { fetcher, token, .. } = &self.source else {
            return Ok(None);
        };
        let fetcher = Arc::clone(fetcher);
        let token = token.clone();
        let cancel = self.cancel.clone();
        let deadline = self.deadline;

        self.fetches += 1;
        log::debug!(
            "fetching {} node={:?} depth={:?}",
            request.tree_id,
            request.node_id.as_ref().map(|id| id.as_str()),
            request.depth
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StreamError::Cancelled),
            () = sleep_until_opt(deadline) => Ok(None),
            result = fetcher.fetch(request, &token) => result.map(Some).map_err(StreamError::from),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
