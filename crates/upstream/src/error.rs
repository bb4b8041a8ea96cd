use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

const BODY_EXCERPT_MAX_CHARS: usize = 256;

/// Typed failures of the fetch boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Unauthorized: token rejected by upstream")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by upstream")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Upstream error {status}: {body_excerpt}")]
    Upstream { status: u16, body_excerpt: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Builds an upstream error with a capped body excerpt.
    pub fn upstream(status: u16, body: &str) -> Self {
        let mut excerpt: String = body.chars().take(BODY_EXCERPT_MAX_CHARS).collect();
        if body.chars().count() > BODY_EXCERPT_MAX_CHARS {
            excerpt.push('…');
        }
        Self::Upstream {
            status,
            body_excerpt: excerpt,
        }
    }

    /// Maps an HTTP-style status to the taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound(body.chars().take(BODY_EXCERPT_MAX_CHARS).collect()),
            429 => Self::RateLimited {
                retry_after_ms: None,
            },
            408 | 504 => Self::Timeout,
            _ => Self::upstream(status, body),
        }
    }

    /// Timeouts, rate limits and 5xx are worth another attempt; everything else is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::Unauthorized | Self::NotFound(_) | Self::InvalidResponse(_) => false,
        }
    }
}
