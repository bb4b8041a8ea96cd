//! # Relay Cache
//!
//! Keyed results of expensive upstream work, shared between concurrent requests.
//!
//! ```text
//! get_or_compute(key) ──> Ready & fresh ──────────────> value (hit)
//!        │
//!        ├──> Pending ──> wait on watch ──> published outcome (coalesced)
//!        │                   └─ leader dropped ──> retry, maybe lead
//!        └──> absent/expired ──> lead: compute() ──> publish
//!                                   · Ok  -> Ready (unless invalidated meanwhile), LRU evict
//!                                   · Err -> waiters only, nothing stored
//! ```

mod cache;
mod config;
mod error;
mod key;

pub use cache::{Cache, CacheStats};
pub use config::{CacheConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use error::{CacheError, Result};
pub use key::CacheKey;
