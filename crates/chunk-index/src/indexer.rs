use crate::config::{ChunkIndexConfig, SUMMARY_MAX_CHARS};
use crate::error::{ChunkIndexError, Result};
use relay_protocol::{
    serialized_len, ChunkIndexEntry, FlatNode, FlatTree, KindCount, NodeId, NodePayload,
    Snapshot,
};

const SUMMARY_TOP_KINDS: usize = 3;

/// Partitions a snapshot into bounded chunks. Pure: the same snapshot and chunk size always
/// give the same entries.
pub fn build(snapshot: &Snapshot, chunk_size: usize) -> Result<Vec<ChunkIndexEntry>> {
    let tree = FlatTree::from_snapshot(snapshot)?;
    build_flat(&tree, chunk_size, SUMMARY_MAX_CHARS)
}

/// Same as [`build`] over an already flattened tree. Slot order is the walk order.
pub fn build_flat(
    tree: &FlatTree,
    chunk_size: usize,
    summary_max_chars: usize,
) -> Result<Vec<ChunkIndexEntry>> {
    if chunk_size == 0 {
        return Err(ChunkIndexError::InvalidChunkSize);
    }

    let mut entries = Vec::with_capacity(tree.len().div_ceil(chunk_size));
    let mut current = ChunkAccumulator::default();
    for (_, node) in tree.iter() {
        current.push(node)?;
        if current.len() == chunk_size {
            let full = std::mem::take(&mut current);
            entries.push(full.finish(entries.len(), summary_max_chars));
        }
    }
    if current.len() > 0 {
        entries.push(current.finish(entries.len(), summary_max_chars));
    }

    log::debug!(
        "indexed {} nodes into {} chunks of <= {chunk_size}",
        tree.len(),
        entries.len()
    );
    Ok(entries)
}

/// The nodes of one chunk, children stripped, in entry order.
pub fn chunk_payload(tree: &FlatTree, entry: &ChunkIndexEntry) -> Result<Vec<NodePayload>> {
    entry
        .node_ids
        .iter()
        .map(|id| {
            tree.slot_of(id)
                .and_then(|slot| tree.get(slot))
                .map(|node| node.payload.clone())
                .ok_or_else(|| ChunkIndexError::UnknownNode(id.to_string()))
        })
        .collect()
}

/// Builder-side wrapper carrying a [`ChunkIndexConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChunkIndexer {
    config: ChunkIndexConfig,
}

impl ChunkIndexer {
    pub fn new(config: ChunkIndexConfig) -> Result<Self> {
        config.validate().map_err(ChunkIndexError::InvalidConfig)?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ChunkIndexConfig {
        &self.config
    }

    /// `chunk_size` falls back to the configured default.
    pub fn build(&self, tree: &FlatTree, chunk_size: Option<usize>) -> Result<Vec<ChunkIndexEntry>> {
        build_flat(
            tree,
            chunk_size.unwrap_or(self.config.chunk_size),
            self.config.summary_max_chars,
        )
    }
}

#[derive(Default)]
struct ChunkAccumulator {
    node_ids: Vec<NodeId>,
    min_depth: usize,
    max_depth: usize,
    estimated_bytes: usize,
    text_chars: usize,
    // first-appearance order
    kinds: Vec<KindCount>,
    first_name: Option<String>,
}

impl ChunkAccumulator {
    fn len(&self) -> usize {
        self.node_ids.len()
    }

    fn push(&mut self, node: &FlatNode) -> Result<()> {
        if self.node_ids.is_empty() {
            self.min_depth = node.depth;
            self.max_depth = node.depth;
        } else {
            self.min_depth = self.min_depth.min(node.depth);
            self.max_depth = self.max_depth.max(node.depth);
        }

        let payload = &node.payload;
        self.estimated_bytes += serialized_len(payload)?;
        self.text_chars += payload.attributes.text_len();
        match self.kinds.iter_mut().find(|count| count.kind == payload.kind) {
            Some(count) => count.count += 1,
            None => self.kinds.push(KindCount {
                kind: payload.kind,
                count: 1,
            }),
        }
        if self.first_name.is_none() {
            self.first_name = payload
                .attributes
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
        }
        self.node_ids.push(payload.id.clone());
        Ok(())
    }

    fn finish(mut self, chunk_id: usize, summary_max_chars: usize) -> ChunkIndexEntry {
        // Stable sort keeps first-appearance order among equal counts.
        self.kinds.sort_by(|a, b| b.count.cmp(&a.count));
        let summary = summarize(self.first_name.as_deref(), &self.kinds, summary_max_chars);
        ChunkIndexEntry {
            chunk_id,
            node_ids: self.node_ids,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            estimated_bytes: self.estimated_bytes,
            summary: Some(summary),
            kind_counts: self.kinds,
            text_chars: self.text_chars,
        }
    }
}

/// `"Header: FRAME×3, TEXT×12"`, cut to `max_chars`.
fn summarize(first_name: Option<&str>, kinds: &[KindCount], max_chars: usize) -> String {
    let counts = kinds
        .iter()
        .take(SUMMARY_TOP_KINDS)
        .map(|count| format!("{}×{}", count.kind, count.count))
        .collect::<Vec<_>>()
        .join(", ");
    let summary = match first_name {
        Some(name) => format!("{name}: {counts}"),
        None => counts,
    };
    truncate_chars(summary, max_chars)
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_protocol::{DesignNode, NodeAttributes, NodeKind, TextContent};

    fn text(id: &str, characters: &str) -> DesignNode {
        DesignNode::new(id, NodeKind::Text).with_attributes(NodeAttributes {
            text: Some(TextContent {
                characters: characters.to_string(),
                font_family: None,
                font_size: None,
            }),
            ..Default::default()
        })
    }

    fn header() -> Snapshot {
        let root = DesignNode::new("1:0", NodeKind::Frame)
            .with_attributes(NodeAttributes::named("Header"))
            .with_children(vec![
                text("1:1", "Home"),
                text("1:2", "Pricing"),
                DesignNode::new("1:3", NodeKind::Frame).with_children(vec![
                    DesignNode::new("1:4", NodeKind::Rectangle),
                    text("1:5", "Sign in"),
                ]),
            ]);
        Snapshot::new("file", root, 0)
    }

    #[test]
    fn chunks_follow_pre_order() {
        let entries = build(&header(), 4).unwrap();
        assert_eq!(entries.len(), 2);
        let ids: Vec<Vec<&str>> = entries
            .iter()
            .map(|e| e.node_ids.iter().map(NodeId::as_str).collect())
            .collect();
        assert_eq!(
            ids,
            vec![vec!["1:0", "1:1", "1:2", "1:3"], vec!["1:4", "1:5"]]
        );
        assert_eq!((entries[0].min_depth, entries[0].max_depth), (0, 1));
        assert_eq!((entries[1].min_depth, entries[1].max_depth), (2, 2));
        assert_eq!(entries[1].chunk_id, 1);
    }

    #[test]
    fn summary_names_first_node_and_top_kinds() {
        let entries = build(&header(), 10).unwrap();
        assert_eq!(
            entries[0].summary.as_deref(),
            Some("Header: TEXT×3, FRAME×2, RECTANGLE×1")
        );
        assert_eq!(entries[0].text_chars, 4 + 7 + 7);
    }

    #[test]
    fn estimated_bytes_ignore_children() {
        let snapshot = header();
        let entries = build(&snapshot, 1).unwrap();
        let root_payload = serialized_len(&snapshot.root.payload()).unwrap();
        assert_eq!(entries[0].estimated_bytes, root_payload);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert_eq!(
            build(&header(), 0).unwrap_err(),
            ChunkIndexError::InvalidChunkSize
        );
    }

    #[test]
    fn long_summaries_are_cut() {
        let summary = summarize(Some(&"x".repeat(300)), &[], 120);
        assert_eq!(summary.chars().count(), 120);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn chunk_payload_returns_entry_nodes() {
        let snapshot = header();
        let tree = FlatTree::from_snapshot(&snapshot).unwrap();
        let entries = build_flat(&tree, 4, SUMMARY_MAX_CHARS).unwrap();
        let payload = chunk_payload(&tree, &entries[1]).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0].kind, NodeKind::Rectangle);
        assert_eq!(payload[1].attributes.text_len(), 7);
    }
}
