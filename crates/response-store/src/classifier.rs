use crate::error::{Result, StoreError};

/// 500 KiB.
pub const DEFAULT_INLINE_MAX_BYTES: u64 = 500 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Inline,
    Offload,
}

/// Decides whether a serialized payload may travel inline.
///
/// `size >= threshold` offloads; anything strictly below stays inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClassifier {
    threshold: u64,
}

impl Default for SizeClassifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_INLINE_MAX_BYTES,
        }
    }
}

impl SizeClassifier {
    pub fn new(threshold: u64) -> Result<Self> {
        if threshold == 0 {
            return Err(StoreError::InvalidConfig(
                "inline threshold must be > 0".to_string(),
            ));
        }
        Ok(Self { threshold })
    }

    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    #[must_use]
    pub const fn classify(&self, serialized_size: u64) -> SizeClass {
        if serialized_size >= self.threshold {
            SizeClass::Offload
        } else {
            SizeClass::Inline
        }
    }

    /// Classifies the serialized buffer itself, so the decision is made on the real length.
    #[must_use]
    pub fn classify_bytes(&self, serialized: &[u8]) -> SizeClass {
        self.classify(serialized.len() as u64)
    }
}
