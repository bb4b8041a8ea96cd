use relay_protocol::{
    ChunkIndexEntry, LargeResultMarker, NodeId, NodePayload, RecursionOverrides, SelectionMode,
    Snapshot,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FetchTreeRequest {
    /// Upstream tree (file) identity
    #[schemars(description = "Upstream tree identity (e.g. a design file key)")]
    pub tree_id: String,

    /// Subtree root (default: the whole tree)
    #[schemars(description = "Node id to fetch the subtree of (default: tree root)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,

    /// Levels below the requested node (default: unlimited)
    #[schemars(description = "Maximum levels below the requested node (default: unlimited)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

impl FetchTreeRequest {
    pub fn tree(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            node_id: None,
            depth: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ChunkIndexRequest {
    #[schemars(description = "Upstream tree identity")]
    pub tree_id: String,

    #[schemars(description = "Node id to index the subtree of (default: tree root)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,

    /// Maximum nodes per chunk (default: 200)
    #[schemars(description = "Maximum nodes per chunk (default: 200)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    #[schemars(description = "How to pick the recommended chunks: heuristic | external_score")]
    #[serde(default)]
    pub selection_mode: SelectionMode,

    /// Recommended chunks to return (default: 5)
    #[schemars(description = "How many recommended chunk ids to return (default: 5)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[schemars(description = "What the caller is working on; passed to the external scorer")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
}

impl ChunkIndexRequest {
    pub fn tree(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            node_id: None,
            chunk_size: None,
            selection_mode: SelectionMode::default(),
            limit: None,
            task_description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ChunkGetRequest {
    #[schemars(description = "index_handle returned by chunk_index")]
    pub index_handle: String,

    #[schemars(description = "chunk_id of one entry returned by chunk_index")]
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StreamRequest {
    #[schemars(description = "Upstream tree identity")]
    pub tree_id: String,

    #[schemars(description = "Node id to start the traversal at (default: tree root)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,

    /// Per-call recursion guards; unset fields use the configured defaults.
    #[schemars(description = "Overrides for max_depth, max_nodes, depth_per_call, timeout_ms")]
    #[serde(default)]
    pub overrides: RecursionOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ReadRangeRequest {
    #[schemars(description = "file_path from a large_result marker")]
    pub path: String,

    #[schemars(description = "Byte offset to start reading at")]
    #[serde(default)]
    pub offset: u64,

    #[schemars(description = "Bytes to read (clamped to the store's range limit)")]
    pub length: u64,
}

/// A fetched tree, inline or replaced by a marker pointing at the stored copy.
#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum FetchResponse {
    Inline {
        snapshot: Arc<Snapshot>,
        size_bytes: u64,
    },
    /// Serialized with `status: "large_result"`.
    Offloaded(LargeResultMarker),
}

impl FetchResponse {
    #[must_use]
    pub fn is_offloaded(&self) -> bool {
        matches!(self, Self::Offloaded(_))
    }

    #[must_use]
    pub fn marker(&self) -> Option<&LargeResultMarker> {
        match self {
            Self::Offloaded(marker) => Some(marker),
            Self::Inline { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct ChunkIndexResponse {
    /// Pass to `chunk_get`. Valid until the index expires from the cache or is invalidated.
    pub index_handle: String,
    pub node_count: usize,
    pub entries: Vec<ChunkIndexEntry>,
    /// Recommended chunk ids, best first.
    pub selected: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct ChunkPayload {
    pub chunk_id: usize,
    pub nodes: Vec<NodePayload>,
}
