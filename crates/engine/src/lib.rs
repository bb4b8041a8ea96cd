//! # Relay Engine
//!
//! Ties the Tree Relay components together behind one [`Engine`]:
//!
//! ```text
//! request ──> Cache (single-flight per key)
//!               │ miss
//!               v
//!        RetryingFetcher ──> TreeFetcher (upstream)
//!               │
//!               ├─ fetch        ──> SizeClassifier ──> inline | ResponseStore + marker
//!               ├─ chunk_index  ──> ChunkIndexer ──> handle = cache key ──> chunk_get
//!               └─ stream       ──> RecursiveStreamer on its own task
//! ```
//!
//! Configuration comes from [`EngineConfig::from_env`] (`TREE_RELAY_*` variables) and errors
//! render to wire envelopes via [`EngineError::envelope`].

mod config;
mod engine;
mod error;
mod request;

pub use config::{
    EngineConfig, DEFAULT_SWEEP_INTERVAL, ENV_AUGMENT_TIMEOUT_MS, ENV_CACHE_CAPACITY,
    ENV_CACHE_TTL_SECS, ENV_FETCH_MAX_ATTEMPTS, ENV_INLINE_MAX_BYTES, ENV_RECURSIVE_DEPTH_PER_CALL,
    ENV_RECURSIVE_MAX_DEPTH, ENV_RECURSIVE_MAX_NODES, ENV_RESPONSE_TTL_SECS, ENV_STORE_DIR,
    ENV_SWEEP_INTERVAL_SECS,
};
pub use engine::{ChunkedTree, Engine};
pub use error::{EngineError, ErrorKind, Result};
pub use request::{
    ChunkGetRequest, ChunkIndexRequest, ChunkIndexResponse, ChunkPayload, FetchResponse,
    FetchTreeRequest, ReadRangeRequest, StreamRequest,
};
