use relay_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunkIndexError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkIndexError {
    #[error("chunk_size must be > 0")]
    InvalidChunkSize,

    #[error("Chunk {index} out of range (index has {count} chunks)")]
    ChunkOutOfRange { index: usize, count: usize },

    #[error("Chunk references a node missing from the tree: {0}")]
    UnknownNode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<serde_json::Error> for ChunkIndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
