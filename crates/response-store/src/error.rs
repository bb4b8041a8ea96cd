use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Response file not found (expired or swept): {0}")]
    NotFound(String),

    #[error("Path is outside the response store: {0}")]
    OutsideStore(String),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("Response store is closed")]
    Closed,
}
