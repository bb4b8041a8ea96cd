use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cannot fingerprint cache parameters: {0}")]
    Fingerprint(String),

    #[error("Malformed cache key: {0}")]
    MalformedKey(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}
