//! # Relay Response Store
//!
//! Decides whether a serialized payload travels inline, and keeps the ones that don't on disk
//! for a bounded time.
//!
//! ```text
//! payload bytes ──> SizeClassifier ──Inline──> returned as-is
//!                        │
//!                     Offload
//!                        v
//!                  ResponseStore ── *.partial ──rename──> {tree}-{ms}-{rand}.{ext}
//!                        │                                    │
//!                 LargeResultMarker                   read_range / sweep(TTL)
//! ```

mod classifier;
mod config;
mod error;
mod paths;
mod store;
mod sweeper;

pub use classifier::{SizeClass, SizeClassifier, DEFAULT_INLINE_MAX_BYTES};
pub use config::{default_store_dir, StoreConfig, DEFAULT_MAX_RANGE_BYTES, DEFAULT_RESPONSE_TTL};
pub use error::{Result, StoreError};
pub use store::{ResponseFile, ResponseStore, StoredPayload, SweepReport};
pub use sweeper::SweeperHandle;
