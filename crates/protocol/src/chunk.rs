use crate::node::{NodeId, NodeKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How many nodes of one kind a chunk covers.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub struct KindCount {
    pub kind: NodeKind,
    pub count: usize,
}

/// One bounded partition of a snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ChunkIndexEntry {
    pub chunk_id: usize,
    /// Covered node ids in pre-order.
    pub node_ids: Vec<NodeId>,
    pub min_depth: usize,
    pub max_depth: usize,
    pub estimated_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Kind histogram, most frequent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kind_counts: Vec<KindCount>,
    /// Characters of text content across the covered nodes.
    #[serde(default)]
    pub text_chars: usize,
}

impl ChunkIndexEntry {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Heuristic,
    ExternalScore,
}
