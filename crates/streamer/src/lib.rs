//! # Relay Streamer
//!
//! Walks a design tree depth-first and hands out one [`relay_protocol::NodeEvent`] per node,
//! fetching deeper levels from upstream only when the consumer gets there.
//!
//! ```text
//!        TreeSource::Snapshot ─┐
//!                              ├─> FlatTree arena ── work stack (slot, depth)
//!  TreeSource::Fetcher ────────┘        ^                  │
//!   (depth_per_call levels/fetch)       │ attach_children  v
//!                                   expand() <── unloaded node?
//!                                                          │
//!                         NodeEvent (children stripped) <──┘
//!                           · is_frontier at max_depth
//!                           · truncated at max_nodes / deadline
//! ```
//!
//! [`spawn_stream`] moves a traversal onto its own task behind a bounded channel; dropping the
//! receiver cancels it.

mod cancel;
mod error;
mod streamer;
mod task;

pub use cancel::CancelToken;
pub use error::{Result, StreamError};
pub use streamer::{RecursiveStreamer, TreeSource};
pub use task::{spawn_stream, EventStream, DEFAULT_STREAM_BUFFER};
