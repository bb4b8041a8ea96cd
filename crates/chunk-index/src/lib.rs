//! # Relay Chunk Index
//!
//! Splits a snapshot into bounded chunks an agent can pull one at a time, and picks the
//! chunks worth reading first.
//!
//! ```text
//! Snapshot ──> FlatTree (pre-order slots)
//!                 │
//!                 ├──> build ──> [ChunkIndexEntry; ceil(n / chunk_size)]
//!                 │                  │
//!                 │                  └──> select ── heuristic (kind weight + text density)
//!                 │                             └── external_score (ChunkScorer)
//!                 └──> chunk_payload(entry) ──> [NodePayload]
//! ```

mod config;
mod error;
mod indexer;
mod selection;

pub use config::{ChunkIndexConfig, DEFAULT_CHUNK_SIZE, DEFAULT_SELECT_LIMIT, SUMMARY_MAX_CHARS};
pub use error::{ChunkIndexError, Result};
pub use indexer::{build, build_flat, chunk_payload, ChunkIndexer};
pub use selection::{
    heuristic_score, kind_weight, select, select_heuristic, ChunkScorer, ChunkSummary,
};
