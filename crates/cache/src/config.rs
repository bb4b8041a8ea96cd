use crate::error::{CacheError, Result};
use std::time::Duration;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Ready entries kept before least-recently-used eviction.
    pub capacity: usize,
    /// TTL for calls that don't pass their own.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            default_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::InvalidConfig("capacity must be > 0".to_string()));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidConfig("ttl must be > 0".to_string()));
        }
        Ok(())
    }
}
