use getrandom::getrandom;
use relay_protocol::ResponseFormat;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

const MAX_COMPONENT_CHARS: usize = 64;

/// Maps a tree identity to a single safe file-name component.
pub(crate) fn safe_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_COMPONENT_CHARS));
    for ch in raw.chars().take(MAX_COMPONENT_CHARS) {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    // No hidden files, no `.`/`..`.
    if out.starts_with('.') {
        out.replace_range(0..1, "_");
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

fn random_suffix() -> String {
    static FALLBACK: AtomicU64 = AtomicU64::new(1);

    let mut bytes = [0u8; 8];
    let value = match getrandom(&mut bytes) {
        Ok(()) => u64::from_be_bytes(bytes),
        Err(err) => {
            log::debug!("getrandom failed, using counter suffix: {err}");
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.subsec_nanos());
            FALLBACK.fetch_add(1, Ordering::Relaxed) ^ (u64::from(nanos) << 20)
        }
    };
    format!("{value:016x}")
}

/// `{sanitized}-{unix_ms}-{random}.{ext}`
pub(crate) fn response_file_name(tree_id: &str, unix_ms: u64, format: ResponseFormat) -> String {
    format!(
        "{}-{unix_ms}-{}.{}",
        safe_component(tree_id),
        random_suffix(),
        format.extension()
    )
}

pub(crate) fn unix_ms(time: std::time::SystemTime) -> u64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_component_blocks_traversal() {
        assert_eq!(safe_component("../../etc/passwd"), "_._.._etc_passwd");
        assert_eq!(safe_component("abc:DEF-1"), "abc_DEF-1");
        assert_eq!(safe_component(""), "_");
        assert_eq!(safe_component("."), "_");
        assert_eq!(safe_component(&"x".repeat(200)).len(), MAX_COMPONENT_CHARS);
    }

    #[test]
    fn file_names_do_not_collide() {
        let a = response_file_name("file", 1, ResponseFormat::Json);
        let b = response_file_name("file", 1, ResponseFormat::Json);
        assert_ne!(a, b);
        assert!(a.starts_with("file-1-"));
        assert!(a.ends_with(".json"));
        assert!(!a.contains('/'));
    }
}
