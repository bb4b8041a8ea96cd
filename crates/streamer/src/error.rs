use relay_protocol::ProtocolError;
use relay_upstream::FetchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Traversal cancelled")]
    Cancelled,

    #[error("Traversal deadline passed before the root was fetched")]
    Timeout,
}
