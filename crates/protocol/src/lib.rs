//! # Relay Protocol
//!
//! Data model and wire records shared by every Tree Relay crate.
//!
//! ```text
//! Snapshot ── DesignNode (closed NodeKind + typed NodeAttributes + ordered children)
//!     │
//!     ├──> FlatTree        index-addressed arena, explicit-stack walks
//!     ├──> NodeEvent       recursive stream record
//!     ├──> ChunkIndexEntry progressive retrieval record
//!     └──> LargeResultMarker
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod chunk;
mod error;
mod event;
mod flat;
mod limits;
mod marker;
mod node;

pub use chunk::{ChunkIndexEntry, KindCount, SelectionMode};
pub use error::{ProtocolError, Result};
pub use event::{NodeEvent, TruncationReason};
pub use flat::{FlatNode, FlatTree};
pub use limits::{
    RecursionLimits, RecursionOverrides, DEFAULT_RECURSIVE_DEPTH_PER_CALL,
    DEFAULT_RECURSIVE_MAX_DEPTH, DEFAULT_RECURSIVE_MAX_NODES, MAX_TREE_DEPTH,
};
pub use marker::{human_size, LargeResultMarker, ResponseFormat, LARGE_RESULT_STATUS};
pub use node::{
    Bounds, Color, DesignNode, LayoutMode, NodeAttributes, NodeId, NodeKind, NodePayload, Paint,
    PaintKind, Snapshot, TextContent,
};

/// Error shape handed to an outer transport.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Serialized byte length of a value, as it would go over the wire.
pub fn serialized_len<T: Serialize>(value: &T) -> serde_json::Result<usize> {
    serde_json::to_vec(value).map(|bytes| bytes.len())
}
