use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::request::{
    ChunkGetRequest, ChunkIndexRequest, ChunkIndexResponse, ChunkPayload, FetchResponse,
    FetchTreeRequest, ReadRangeRequest, StreamRequest,
};
use relay_cache::{Cache, CacheKey, CacheStats};
use relay_chunk_index::{chunk_payload, select, ChunkIndexError, ChunkIndexer, ChunkScorer};
use relay_protocol::{
    ChunkIndexEntry, FlatTree, NodeId, ResponseFormat, Snapshot, MAX_TREE_DEPTH,
};
use relay_response_store::{ResponseStore, StoredPayload, SweeperHandle};
use relay_streamer::{
    spawn_stream, EventStream, RecursiveStreamer, TreeSource, DEFAULT_STREAM_BUFFER,
};
use relay_upstream::{augment_bounded, Augmenter, FetchRequest, RetryingFetcher, TreeFetcher};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

const OP_SNAPSHOT: &str = "snapshot";
const OP_FETCH: &str = "fetch";
const OP_CHUNK_INDEX: &str = "chunk_index";

/// A snapshot indexed into chunks. Kept in the cache under the index handle.
#[derive(Debug)]
pub struct ChunkedTree {
    pub tree: FlatTree,
    pub entries: Vec<ChunkIndexEntry>,
}

#[derive(Debug, Clone)]
enum CachedValue {
    Snapshot(Arc<Snapshot>),
    Response(Arc<FetchResponse>),
    Index(Arc<ChunkedTree>),
}

impl CachedValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => OP_SNAPSHOT,
            Self::Response(_) => OP_FETCH,
            Self::Index(_) => OP_CHUNK_INDEX,
        }
    }
}

/// Front door of Tree Relay: cached upstream fetches, offloading of large payloads,
/// progressive chunk retrieval and bounded streaming.
///
/// Every cached computation is keyed by `(tree_id, operation, parameters)`, so identical
/// concurrent requests cost one upstream call.
pub struct Engine {
    config: EngineConfig,
    fetcher: Arc<dyn TreeFetcher>,
    token: String,
    store: ResponseStore,
    cache: Cache<CachedValue, EngineError>,
    indexer: ChunkIndexer,
    scorer: Option<Arc<dyn ChunkScorer>>,
    augmenter: Option<Arc<dyn Augmenter>>,
}

impl Engine {
    /// Validates `config`, opens the response store and wraps `fetcher` with the configured
    /// retry policy.
    pub async fn open<F>(config: EngineConfig, fetcher: F) -> Result<Self>
    where
        F: TreeFetcher + 'static,
    {
        config.validate().map_err(EngineError::Validation)?;
        let store = ResponseStore::open(config.store.clone()).await?;
        let cache = Cache::new(config.cache)?;
        let indexer = ChunkIndexer::new(config.chunking)?;
        let fetcher: Arc<dyn TreeFetcher> = Arc::new(RetryingFetcher::new(fetcher, config.retry));

        log::info!(
            "engine ready: store={} inline_max={} cache_capacity={}",
            store.dir().display(),
            config.store.inline_max_bytes,
            config.cache.capacity
        );

        Ok(Self {
            config,
            fetcher,
            token: String::new(),
            store,
            cache,
            indexer,
            scorer: None,
            augmenter: None,
        })
    }

    /// Credential passed to every upstream fetch.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn ChunkScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    #[must_use]
    pub fn with_augmenter(mut self, augmenter: Arc<dyn Augmenter>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &ResponseStore {
        &self.store
    }

    /// The snapshot for `request`, from cache or a single coalesced upstream fetch.
    pub async fn snapshot(&self, request: &FetchTreeRequest) -> Result<Arc<Snapshot>> {
        validate_node_id(request.node_id.as_ref())?;
        let key = CacheKey::new(
            &request.tree_id,
            &json!({ "op": OP_SNAPSHOT, "node_id": request.node_id, "depth": request.depth }),
        )?;
        let value = self
            .cache
            .get_or_compute(&key, || self.load_snapshot(request), None)
            .await?;
        match value {
            CachedValue::Snapshot(snapshot) => Ok(snapshot),
            other => Err(mismatch(&key, &other)),
        }
    }

    /// Fetches a tree and returns it inline, or offloads it and returns a large-result marker.
    ///
    /// The decision is made on the serialized length. Repeated calls within the cache TTL
    /// return the same response (and the same stored file).
    pub async fn fetch(&self, request: &FetchTreeRequest) -> Result<Arc<FetchResponse>> {
        validate_node_id(request.node_id.as_ref())?;
        let key = CacheKey::new(
            &request.tree_id,
            &json!({ "op": OP_FETCH, "node_id": request.node_id, "depth": request.depth }),
        )?;

        let value = self
            .cache
            .get_or_compute(&key, || self.render_response(request), None)
            .await?;
        match value {
            CachedValue::Response(response) => Ok(response),
            other => Err(mismatch(&key, &other)),
        }
    }

    /// Reads part of an offloaded response.
    pub async fn read_range(&self, request: &ReadRangeRequest) -> Result<Vec<u8>> {
        if request.path.trim().is_empty() {
            return Err(EngineError::Validation("path must not be empty".to_string()));
        }
        Ok(self
            .store
            .read_range(Path::new(&request.path), request.offset, request.length)
            .await?)
    }

    /// Partitions the tree into chunks and recommends which to read first.
    ///
    /// The returned `index_handle` addresses the cached index; `chunk_get` serves from it
    /// without touching upstream.
    pub async fn chunk_index(&self, request: &ChunkIndexRequest) -> Result<ChunkIndexResponse> {
        validate_node_id(request.node_id.as_ref())?;
        let chunk_size = request
            .chunk_size
            .unwrap_or(self.indexer.config().chunk_size);
        if chunk_size == 0 {
            return Err(ChunkIndexError::InvalidChunkSize.into());
        }
        let key = CacheKey::new(
            &request.tree_id,
            &json!({
                "op": OP_CHUNK_INDEX,
                "node_id": request.node_id,
                "chunk_size": chunk_size,
            }),
        )?;
        let value = self
            .cache
            .get_or_compute(&key, || self.build_index(request, chunk_size), None)
            .await?;
        let chunked = match value {
            CachedValue::Index(chunked) => chunked,
            other => return Err(mismatch(&key, &other)),
        };

        let limit = request
            .limit
            .unwrap_or(self.indexer.config().select_limit);
        let selected = select(
            &chunked.entries,
            request.selection_mode,
            limit,
            request.task_description.as_deref(),
            self.scorer.as_deref(),
        )
        .await;

        Ok(ChunkIndexResponse {
            index_handle: key.as_str().to_string(),
            node_count: chunked.tree.len(),
            entries: chunked.entries.clone(),
            selected,
        })
    }

    /// Materialises one chunk of a previously built index.
    pub fn chunk_get(&self, request: &ChunkGetRequest) -> Result<ChunkPayload> {
        let key = CacheKey::parse(&request.index_handle)
            .map_err(|_| EngineError::UnknownHandle(request.index_handle.clone()))?;
        let chunked = match self.cache.peek(&key) {
            Some(CachedValue::Index(chunked)) => chunked,
            _ => return Err(EngineError::UnknownHandle(request.index_handle.clone())),
        };
        let entry = chunked.entries.get(request.chunk_index).ok_or(
            ChunkIndexError::ChunkOutOfRange {
                index: request.chunk_index,
                count: chunked.entries.len(),
            },
        )?;
        Ok(ChunkPayload {
            chunk_id: entry.chunk_id,
            nodes: chunk_payload(&chunked.tree, entry)?,
        })
    }

    /// A lazy traversal the caller drives with `next().await`.
    ///
    /// A whole tree already in the cache is walked from memory; otherwise levels are fetched
    /// `depth_per_call` at a time as the caller advances.
    pub fn streamer(&self, request: &StreamRequest) -> Result<RecursiveStreamer> {
        validate_node_id(request.node_id.as_ref())?;
        let limits = self.config.recursion.with_overrides(&request.overrides);
        let source = match self.cached_snapshot(&request.tree_id, request.node_id.as_ref()) {
            Some(snapshot) => TreeSource::Snapshot(snapshot),
            None => TreeSource::Fetcher {
                fetcher: Arc::clone(&self.fetcher),
                request: FetchRequest::tree(&request.tree_id).node_opt(request.node_id.clone()),
                token: self.token.clone(),
            },
        };
        Ok(RecursiveStreamer::new(source, limits)?)
    }

    /// Runs the traversal on its own task. Dropping the returned stream cancels it.
    pub fn stream(&self, request: &StreamRequest) -> Result<EventStream> {
        Ok(spawn_stream(self.streamer(request)?, DEFAULT_STREAM_BUFFER))
    }

    /// Extra attributes for one node from the injected augmenter, bounded by the configured
    /// timeout. `None` without an augmenter, on timeout, or when it has nothing to add.
    pub async fn augment(&self, node_id: &NodeId) -> Result<Option<Value>> {
        validate_node_id(Some(node_id))?;
        let Some(augmenter) = &self.augmenter else {
            return Ok(None);
        };
        Ok(augment_bounded(
            Arc::clone(augmenter),
            node_id.clone(),
            self.config.augment_timeout,
        )
        .await)
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops cached entries matching `pattern`.
    ///
    /// A bare tree id (no `#`, no trailing `*`) drops everything cached for exactly that tree.
    /// Otherwise `pattern` is a key prefix: `"file*"` also matches `file2`, and a full key such
    /// as an index handle matches only itself.
    pub fn cache_invalidate(&self, pattern: &str) -> usize {
        let removed = if pattern.ends_with('*') || pattern.contains('#') {
            self.cache.invalidate(pattern)
        } else {
            self.cache.invalidate(&format!("{pattern}#"))
        };
        log::info!("invalidated {removed} cache entries matching {pattern:?}");
        removed
    }

    /// Starts the periodic TTL sweep of the response store.
    #[must_use]
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.store.spawn_sweeper(self.config.sweep_interval)
    }

    /// Closes the response store; running sweepers stop and later offloads fail.
    pub fn close(&self) {
        self.store.close();
    }

    async fn load_snapshot(&self, request: &FetchTreeRequest) -> Result<CachedValue> {
        let upstream = FetchRequest {
            tree_id: request.tree_id.clone(),
            node_id: request.node_id.clone(),
            depth: request.depth,
        };
        let snapshot = self.fetcher.fetch(&upstream, &self.token).await?;
        let height = snapshot.root.height();
        if height > MAX_TREE_DEPTH {
            log::warn!(
                "rejecting {}: {height} levels deep (max {MAX_TREE_DEPTH})",
                snapshot.tree_id
            );
            return Err(EngineError::Validation(format!(
                "tree {} is {height} levels deep; the limit is {MAX_TREE_DEPTH}",
                snapshot.tree_id
            )));
        }
        log::debug!(
            "fetched {} ({} nodes)",
            snapshot.tree_id,
            snapshot.node_count()
        );
        Ok(CachedValue::Snapshot(Arc::new(snapshot)))
    }

    async fn render_response(&self, request: &FetchTreeRequest) -> Result<CachedValue> {
        let snapshot = self.snapshot(request).await?;
        let payload = serde_json::to_vec(snapshot.as_ref())?;
        let size_bytes = payload.len() as u64;
        let response = match self
            .store
            .offload(&snapshot.tree_id, payload, ResponseFormat::Json)
            .await?
        {
            StoredPayload::Inline(_) => FetchResponse::Inline {
                snapshot,
                size_bytes,
            },
            StoredPayload::Offloaded(file) => FetchResponse::Offloaded(file.marker()),
        };
        Ok(CachedValue::Response(Arc::new(response)))
    }

    async fn build_index(
        &self,
        request: &ChunkIndexRequest,
        chunk_size: usize,
    ) -> Result<CachedValue> {
        let fetch = FetchTreeRequest {
            tree_id: request.tree_id.clone(),
            node_id: request.node_id.clone(),
            depth: None,
        };
        let snapshot = self.snapshot(&fetch).await?;
        let tree = FlatTree::from_snapshot(&snapshot)?;
        let entries = self.indexer.build(&tree, Some(chunk_size))?;
        log::info!(
            "indexed {} into {} chunks of <= {chunk_size} nodes",
            snapshot.tree_id,
            entries.len()
        );
        Ok(CachedValue::Index(Arc::new(ChunkedTree { tree, entries })))
    }

    fn cached_snapshot(&self, tree_id: &str, node_id: Option<&NodeId>) -> Option<Arc<Snapshot>> {
        let key = CacheKey::new(
            tree_id,
            &json!({ "op": OP_SNAPSHOT, "node_id": node_id, "depth": Option::<usize>::None }),
        )
        .ok()?;
        match self.cache.peek(&key)? {
            CachedValue::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

fn validate_node_id(node_id: Option<&NodeId>) -> Result<()> {
    match node_id {
        Some(id) if !id.is_well_formed() => {
            Err(EngineError::Validation(format!("malformed node id {:?}", id.as_str())))
        }
        _ => Ok(()),
    }
}

fn mismatch(key: &CacheKey, value: &CachedValue) -> EngineError {
    EngineError::Validation(format!(
        "cache entry {key} holds a {} value",
        value.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::{DesignNode, NodeKind};
    use relay_upstream::StaticTreeFetcher;
    use tempfile::TempDir;

    fn fetcher() -> StaticTreeFetcher {
        let root = DesignNode::new("0:0", NodeKind::Canvas).with_children(vec![
            DesignNode::new("1:0", NodeKind::Frame)
                .with_children(vec![DesignNode::new("1:1", NodeKind::Text)]),
        ]);
        StaticTreeFetcher::new().with_snapshot(Snapshot::new("file", root, 1))
    }

    async fn engine(dir: &TempDir) -> Engine {
        let config = EngineConfig::default().with_store_dir(dir.path());
        Engine::open(config, fetcher()).await.unwrap()
    }

    #[tokio::test]
    async fn malformed_node_id_is_rejected_before_fetching() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let request = FetchTreeRequest {
            node_id: Some(NodeId::new("a/b")),
            ..FetchTreeRequest::tree("file")
        };
        let err = engine.snapshot(&request).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert_eq!(engine.cache_stats().misses, 0);
    }

    #[tokio::test]
    async fn separator_in_tree_id_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let err = engine
            .fetch(&FetchTreeRequest::tree("a#b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn streamer_walks_cached_snapshot_from_memory() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        engine.snapshot(&FetchTreeRequest::tree("file")).await.unwrap();

        let streamer = engine
            .streamer(&StreamRequest {
                tree_id: "file".to_string(),
                node_id: None,
                overrides: Default::default(),
            })
            .unwrap();
        let events = streamer.collect().await.unwrap();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn augment_without_augmenter_is_none() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        assert_eq!(engine.augment(&NodeId::new("1:1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir).await;
        let request = ChunkIndexRequest {
            chunk_size: Some(0),
            ..ChunkIndexRequest::tree("file")
        };
        let err = engine.chunk_index(&request).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }
}
