//! # Relay Upstream
//!
//! The boundary between Tree Relay and the service that owns the design trees.
//!
//! - [`TreeFetcher`] supplies snapshots; transport and authentication live behind it.
//! - [`RetryingFetcher`] is the only place transient failures are retried.
//! - [`Augmenter`] is the optional synchronous source of extra node attributes, always called
//!   through [`augment_bounded`].

mod augment;
mod error;
mod fetcher;
mod fixture;

pub use augment::{augment_bounded, Augmenter, DEFAULT_AUGMENT_TIMEOUT};
pub use error::{FetchError, Result};
pub use fetcher::{FetchRequest, RetryPolicy, RetryingFetcher, TreeFetcher};
pub use fixture::StaticTreeFetcher;
