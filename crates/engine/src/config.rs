use relay_cache::{CacheConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use relay_chunk_index::ChunkIndexConfig;
use relay_protocol::{
    RecursionLimits, DEFAULT_RECURSIVE_DEPTH_PER_CALL, DEFAULT_RECURSIVE_MAX_DEPTH,
    DEFAULT_RECURSIVE_MAX_NODES,
};
use relay_response_store::{
    default_store_dir, StoreConfig, DEFAULT_INLINE_MAX_BYTES, DEFAULT_RESPONSE_TTL,
};
use relay_upstream::{RetryPolicy, DEFAULT_AUGMENT_TIMEOUT};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_INLINE_MAX_BYTES: &str = "TREE_RELAY_INLINE_MAX_BYTES";
pub const ENV_STORE_DIR: &str = "TREE_RELAY_STORE_DIR";
pub const ENV_RESPONSE_TTL_SECS: &str = "TREE_RELAY_RESPONSE_TTL_SECS";
pub const ENV_RECURSIVE_MAX_DEPTH: &str = "TREE_RELAY_RECURSIVE_MAX_DEPTH";
pub const ENV_RECURSIVE_MAX_NODES: &str = "TREE_RELAY_RECURSIVE_MAX_NODES";
pub const ENV_RECURSIVE_DEPTH_PER_CALL: &str = "TREE_RELAY_RECURSIVE_DEPTH_PER_CALL";
pub const ENV_CACHE_CAPACITY: &str = "TREE_RELAY_CACHE_CAPACITY";
pub const ENV_CACHE_TTL_SECS: &str = "TREE_RELAY_CACHE_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "TREE_RELAY_SWEEP_INTERVAL_SECS";
pub const ENV_AUGMENT_TIMEOUT_MS: &str = "TREE_RELAY_AUGMENT_TIMEOUT_MS";
pub const ENV_FETCH_MAX_ATTEMPTS: &str = "TREE_RELAY_FETCH_MAX_ATTEMPTS";

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const MAX_INLINE_BYTES: u64 = 64 * 1024 * 1024;
const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_RECURSIVE_DEPTH: usize = 1_000;
const MAX_RECURSIVE_NODES: usize = 1_000_000;
const MAX_DEPTH_PER_CALL: usize = 20;
const MAX_CACHE_CAPACITY: usize = 100_000;
const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_AUGMENT_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
const MAX_FETCH_ATTEMPTS: u32 = 10;

/// Everything the engine needs to start. `Default` is the built-in configuration;
/// [`EngineConfig::from_env`] layers environment overrides on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub recursion: RecursionLimits,
    pub chunking: ChunkIndexConfig,
    pub retry: RetryPolicy,
    pub sweep_interval: Duration,
    pub augment_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            recursion: RecursionLimits::default(),
            chunking: ChunkIndexConfig::default(),
            retry: RetryPolicy::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            augment_timeout: DEFAULT_AUGMENT_TIMEOUT,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`. Unparsable values fall back to the default; parsed
    /// values are clamped to a sane range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name);

        let store_dir = get(ENV_STORE_DIR)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map_or_else(default_store_dir, PathBuf::from);

        let store = StoreConfig {
            dir: store_dir,
            ttl: Duration::from_secs(parse_clamped(
                get(ENV_RESPONSE_TTL_SECS).as_deref(),
                DEFAULT_RESPONSE_TTL.as_secs(),
                1,
                MAX_TTL_SECS,
            )),
            inline_max_bytes: parse_clamped(
                get(ENV_INLINE_MAX_BYTES).as_deref(),
                DEFAULT_INLINE_MAX_BYTES,
                1,
                MAX_INLINE_BYTES,
            ),
            ..StoreConfig::default()
        };

        let cache = CacheConfig {
            capacity: parse_clamped(
                get(ENV_CACHE_CAPACITY).as_deref(),
                DEFAULT_CACHE_CAPACITY,
                1,
                MAX_CACHE_CAPACITY,
            ),
            default_ttl: Duration::from_secs(parse_clamped(
                get(ENV_CACHE_TTL_SECS).as_deref(),
                DEFAULT_CACHE_TTL.as_secs(),
                1,
                MAX_TTL_SECS,
            )),
        };

        let recursion = RecursionLimits {
            max_depth: parse_clamped(
                get(ENV_RECURSIVE_MAX_DEPTH).as_deref(),
                DEFAULT_RECURSIVE_MAX_DEPTH,
                0,
                MAX_RECURSIVE_DEPTH,
            ),
            max_nodes: parse_clamped(
                get(ENV_RECURSIVE_MAX_NODES).as_deref(),
                DEFAULT_RECURSIVE_MAX_NODES,
                1,
                MAX_RECURSIVE_NODES,
            ),
            depth_per_call: parse_clamped(
                get(ENV_RECURSIVE_DEPTH_PER_CALL).as_deref(),
                DEFAULT_RECURSIVE_DEPTH_PER_CALL,
                1,
                MAX_DEPTH_PER_CALL,
            ),
            timeout_ms: None,
        };

        let retry = RetryPolicy {
            max_attempts: parse_clamped(
                get(ENV_FETCH_MAX_ATTEMPTS).as_deref(),
                RetryPolicy::default().max_attempts,
                1,
                MAX_FETCH_ATTEMPTS,
            ),
            ..RetryPolicy::default()
        };

        Self {
            store,
            cache,
            recursion,
            chunking: ChunkIndexConfig::default(),
            retry,
            sweep_interval: Duration::from_secs(parse_clamped(
                get(ENV_SWEEP_INTERVAL_SECS).as_deref(),
                DEFAULT_SWEEP_INTERVAL.as_secs(),
                1,
                MAX_SWEEP_INTERVAL_SECS,
            )),
            augment_timeout: Duration::from_millis(parse_clamped(
                get(ENV_AUGMENT_TIMEOUT_MS).as_deref(),
                u64::try_from(DEFAULT_AUGMENT_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                1,
                MAX_AUGMENT_TIMEOUT_MS,
            )),
        }
    }

    /// Keeps the store directory and points it at `dir`. Handy for tests and tools.
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store.dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.store.validate().map_err(|err| err.to_string())?;
        self.cache.validate().map_err(|err| err.to_string())?;
        self.recursion.validate().map_err(|err| err.to_string())?;
        self.chunking.validate()?;
        // Cached large-result markers must not outlive the files they point at.
        if self.cache.default_ttl > self.store.ttl {
            return Err(format!(
                "cache ttl ({:?}) must not exceed response ttl ({:?})",
                self.cache.default_ttl, self.store.ttl
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err("sweep_interval must be > 0".to_string());
        }
        if self.augment_timeout.is_zero() {
            return Err("augment_timeout must be > 0".to_string());
        }
        Ok(())
    }
}

fn parse_clamped<T>(raw: Option<&str>, default_value: T, min: T, max: T) -> T
where
    T: FromStr + Ord,
{
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default_value)
        .clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config.store.inline_max_bytes, 512_000);
        assert_eq!(config.store.ttl, Duration::from_secs(3600));
        assert_eq!(config.recursion, RecursionLimits::default());
        assert_eq!(config.cache.capacity, 256);
        assert_eq!(config.augment_timeout, Duration::from_millis(20_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_INLINE_MAX_BYTES, "1024"),
            (ENV_STORE_DIR, "/tmp/relay-test"),
            (ENV_RECURSIVE_MAX_NODES, "100"),
            (ENV_FETCH_MAX_ATTEMPTS, "5"),
        ]));
        assert_eq!(config.store.inline_max_bytes, 1024);
        assert_eq!(config.store.dir, PathBuf::from("/tmp/relay-test"));
        assert_eq!(config.recursion.max_nodes, 100);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn garbage_falls_back_and_extremes_clamp() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_INLINE_MAX_BYTES, "lots"),
            (ENV_RECURSIVE_DEPTH_PER_CALL, "0"),
            (ENV_CACHE_CAPACITY, "999999999"),
            (ENV_STORE_DIR, "   "),
        ]));
        assert_eq!(config.store.inline_max_bytes, DEFAULT_INLINE_MAX_BYTES);
        assert_eq!(config.recursion.depth_per_call, 1);
        assert_eq!(config.cache.capacity, MAX_CACHE_CAPACITY);
        assert_eq!(config.store.dir, default_store_dir());
    }

    #[test]
    fn cache_ttl_longer_than_response_ttl_is_rejected() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_RESPONSE_TTL_SECS, "60"),
            (ENV_CACHE_TTL_SECS, "600"),
        ]));
        assert!(config.validate().unwrap_err().contains("cache ttl"));
    }
}
