use crate::node::{NodeId, NodeKind, NodePayload};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    MaxNodes,
    Timeout,
}

/// One record of a recursive stream.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct NodeEvent {
    pub node_id: NodeId,
    pub kind: NodeKind,
    /// The node without its `children` field.
    pub payload: NodePayload,
    pub depth: usize,
    /// Children the node has (known so far); they arrive as later events unless this is a
    /// frontier node.
    pub child_count: usize,
    pub is_frontier: bool,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<TruncationReason>,
    /// Known nodes not emitted yet. Only set on the truncated event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<usize>,
}

impl NodeEvent {
    #[must_use]
    pub fn new(payload: NodePayload, depth: usize, child_count: usize) -> Self {
        Self {
            node_id: payload.id.clone(),
            kind: payload.kind,
            payload,
            depth,
            child_count,
            is_frontier: false,
            truncated: false,
            truncation: None,
            remaining: None,
        }
    }

    #[must_use]
    pub fn frontier(mut self) -> Self {
        self.is_frontier = true;
        self
    }

    #[must_use]
    pub fn truncate(mut self, reason: TruncationReason, remaining: usize) -> Self {
        self.truncated = true;
        self.truncation = Some(reason);
        self.remaining = Some(remaining);
        self
    }
}
