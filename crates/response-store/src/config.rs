use crate::classifier::DEFAULT_INLINE_MAX_BYTES;
use crate::error::{Result, StoreError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(60 * 60);
/// Upper bound of a single `read_range` call.
pub const DEFAULT_MAX_RANGE_BYTES: u64 = 8 * 1024 * 1024;

const STORE_DIR_NAME: &str = "tree-relay";
const RESPONSES_DIR_NAME: &str = "responses";

/// Configuration for a [`crate::ResponseStore`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory owned by the store. Files are kept flat inside it.
    pub dir: PathBuf,

    /// How long a stored response stays retrievable.
    pub ttl: Duration,

    /// Payloads of at least this many serialized bytes are offloaded.
    pub inline_max_bytes: u64,

    /// Larger `read_range` requests are clamped to this length.
    pub max_range_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            ttl: DEFAULT_RESPONSE_TTL,
            inline_max_bytes: DEFAULT_INLINE_MAX_BYTES,
            max_range_bytes: DEFAULT_MAX_RANGE_BYTES,
        }
    }
}

impl StoreConfig {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("store dir is empty".to_string()));
        }
        if self.ttl.is_zero() {
            return Err(StoreError::InvalidConfig("ttl must be > 0".to_string()));
        }
        if self.inline_max_bytes == 0 {
            return Err(StoreError::InvalidConfig(
                "inline_max_bytes must be > 0".to_string(),
            ));
        }
        if self.max_range_bytes == 0 {
            return Err(StoreError::InvalidConfig(
                "max_range_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<os cache dir>/tree-relay/responses`, or the temp dir when no cache dir is known.
#[must_use]
pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STORE_DIR_NAME)
        .join(RESPONSES_DIR_NAME)
}
