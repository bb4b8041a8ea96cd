use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LARGE_RESULT_STATUS: &str = "large_result";

/// Format tag of a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Json,
    Dsl,
    Html,
    Text,
}

impl ResponseFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Dsl => "dsl",
            Self::Html => "html",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Dsl => "dsl.json",
            Self::Html => "html",
            Self::Text => "txt",
        }
    }

    /// Inverse of [`ResponseFormat::extension`], matched against a full file name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        // `dsl.json` must win over `json`.
        [Self::Dsl, Self::Json, Self::Html, Self::Text]
            .into_iter()
            .find(|format| name.ends_with(&format!(".{}", format.extension())))
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned in place of an inline payload when the payload was offloaded to the response store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct LargeResultMarker {
    pub status: String,
    pub file_path: String,
    pub size_bytes: u64,
    pub size_human: String,
    pub format: ResponseFormat,
    pub hint: String,
}

impl LargeResultMarker {
    #[must_use]
    pub fn new(file_path: String, size_bytes: u64, format: ResponseFormat) -> Self {
        let hint = format!(
            "Payload of {} exceeds the inline limit. Read it progressively with read_range \
             (path, offset, length) or fetch chunks via chunk_index/chunk_get.",
            human_size(size_bytes)
        );
        Self {
            status: LARGE_RESULT_STATUS.to_string(),
            file_path,
            size_bytes,
            size_human: human_size(size_bytes),
            format,
            hint,
        }
    }
}

/// Binary units with one decimal: `512 B`, `1.5 KiB`, `2.0 MiB`.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_size_uses_binary_units() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(512_000), "500.0 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn marker_serializes_status_tag() {
        let marker = LargeResultMarker::new("/tmp/x.json".to_string(), 2048, ResponseFormat::Json);
        let value = serde_json::to_value(&marker).unwrap();
        assert_eq!(value["status"], "large_result");
        assert_eq!(value["size_human"], "2.0 KiB");
        assert_eq!(value["format"], "json");
    }

    #[test]
    fn format_from_file_name_prefers_longest_extension() {
        assert_eq!(
            ResponseFormat::from_file_name("a-1-ff.dsl.json"),
            Some(ResponseFormat::Dsl)
        );
        assert_eq!(
            ResponseFormat::from_file_name("a-1-ff.json"),
            Some(ResponseFormat::Json)
        );
        assert_eq!(ResponseFormat::from_file_name("a-1-ff.partial"), None);
    }
}
