use relay_cache::CacheError;
use relay_chunk_index::ChunkIndexError;
use relay_protocol::{ErrorEnvelope, ProtocolError};
use relay_response_store::StoreError;
use relay_streamer::StreamError;
use relay_upstream::FetchError;
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse class of an [`EngineError`], deciding how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input. Fix the request; retrying as-is fails again.
    Validation,
    /// The upstream tree source failed (already retried if transient).
    Upstream,
    /// Local disk trouble in the response store.
    Storage,
    Cancelled,
}

/// Errors are `Clone` so one failed computation can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Response store error: {0}")]
    Store(Arc<StoreError>),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    ChunkIndex(#[from] ChunkIndexError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Unknown or expired index handle: {0}")]
    UnknownHandle(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::UnknownHandle(_)
            | Self::ChunkIndex(_)
            | Self::Protocol(_)
            | Self::Cache(_) => ErrorKind::Validation,
            Self::Fetch(_) => ErrorKind::Upstream,
            Self::Store(err) => match err.as_ref() {
                StoreError::NotFound(_) | StoreError::OutsideStore(_) => ErrorKind::Validation,
                StoreError::IoError(_) | StoreError::InvalidConfig(_) | StoreError::Closed => {
                    ErrorKind::Storage
                }
            },
            Self::Stream(err) => match err {
                StreamError::Cancelled => ErrorKind::Cancelled,
                StreamError::Fetch(_) | StreamError::Timeout => ErrorKind::Upstream,
                StreamError::Protocol(_) => ErrorKind::Validation,
            },
            Self::Serialization(_) => ErrorKind::Storage,
        }
    }

    /// Machine-readable code for the wire envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(FetchError::Unauthorized) => "unauthorized",
            Self::Fetch(FetchError::NotFound(_)) => "not_found",
            Self::Fetch(FetchError::RateLimited { .. }) => "rate_limited",
            Self::Store(err) if matches!(err.as_ref(), StoreError::NotFound(_)) => {
                "response_expired"
            }
            Self::UnknownHandle(_) => "unknown_handle",
            Self::ChunkIndex(ChunkIndexError::ChunkOutOfRange { .. }) => "chunk_out_of_range",
            _ => match self.kind() {
                ErrorKind::Validation => "invalid_request",
                ErrorKind::Upstream => "upstream_error",
                ErrorKind::Storage => "storage_error",
                ErrorKind::Cancelled => "cancelled",
            },
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownHandle(_) => {
                Some("The chunk index expired or was invalidated. Call chunk_index again.")
            }
            Self::ChunkIndex(ChunkIndexError::ChunkOutOfRange { .. }) => {
                Some("Use a chunk_id from the entries returned by chunk_index.")
            }
            Self::Store(err) if matches!(err.as_ref(), StoreError::NotFound(_)) => {
                Some("The stored response was swept after its TTL. Repeat the original request.")
            }
            Self::Fetch(FetchError::Unauthorized) => Some("Check the upstream access token."),
            Self::Fetch(FetchError::RateLimited { .. }) => {
                Some("Upstream is rate limiting; wait before retrying.")
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        let envelope = ErrorEnvelope::new(self.code(), self.to_string());
        match self.hint() {
            Some(hint) => envelope.with_hint(hint),
            None => envelope,
        }
    }
}
