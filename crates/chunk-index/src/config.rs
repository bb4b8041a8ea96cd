use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_SELECT_LIMIT: usize = 5;
pub const SUMMARY_MAX_CHARS: usize = 120;

/// Defaults applied when a `chunk_index` call leaves a parameter out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkIndexConfig {
    /// Maximum nodes per chunk.
    pub chunk_size: usize,

    /// How many chunks `select` returns.
    pub select_limit: usize,

    /// Summaries longer than this are cut with an ellipsis.
    pub summary_max_chars: usize,
}

impl Default for ChunkIndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            select_limit: DEFAULT_SELECT_LIMIT,
            summary_max_chars: SUMMARY_MAX_CHARS,
        }
    }
}

impl ChunkIndexConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }
        if self.summary_max_chars < 8 {
            return Err("summary_max_chars must be >= 8".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ChunkIndexConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let config = ChunkIndexConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
