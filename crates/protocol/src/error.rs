use crate::node::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Duplicate node id in snapshot: {0}")]
    DuplicateNodeId(NodeId),

    #[error("Malformed node id: {0:?}")]
    InvalidNodeId(String),

    #[error("Arena slot out of range: {0}")]
    SlotOutOfRange(usize),

    #[error("Invalid limits: {0}")]
    InvalidLimits(String),
}
