use crate::error::{ProtocolError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECURSIVE_MAX_DEPTH: usize = 20;
pub const DEFAULT_RECURSIVE_MAX_NODES: usize = 5_000;
pub const DEFAULT_RECURSIVE_DEPTH_PER_CALL: usize = 1;

/// Deepest snapshot (levels below the root) accepted for caching and serialization.
pub const MAX_TREE_DEPTH: usize = 256;

/// Guards of one recursive traversal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub struct RecursionLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
    pub depth_per_call: usize,
    /// Wall-clock budget of the whole traversal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for RecursionLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_RECURSIVE_MAX_DEPTH,
            max_nodes: DEFAULT_RECURSIVE_MAX_NODES,
            depth_per_call: DEFAULT_RECURSIVE_DEPTH_PER_CALL,
            timeout_ms: None,
        }
    }
}

impl RecursionLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_nodes == 0 {
            return Err(ProtocolError::InvalidLimits(
                "max_nodes must be > 0".to_string(),
            ));
        }
        if self.depth_per_call == 0 {
            return Err(ProtocolError::InvalidLimits(
                "depth_per_call must be > 0".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ProtocolError::InvalidLimits(
                "timeout_ms must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-call overrides win over these defaults.
    #[must_use]
    pub fn with_overrides(self, overrides: &RecursionOverrides) -> Self {
        Self {
            max_depth: overrides.max_depth.unwrap_or(self.max_depth),
            max_nodes: overrides.max_nodes.unwrap_or(self.max_nodes),
            depth_per_call: overrides.depth_per_call.unwrap_or(self.depth_per_call),
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub struct RecursionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_per_call: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
