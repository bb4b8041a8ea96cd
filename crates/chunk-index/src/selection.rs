use async_trait::async_trait;
use relay_protocol::{ChunkIndexEntry, NodeKind, SelectionMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Text characters per estimated byte are scaled by this before adding to the kind weight.
const TEXT_DENSITY_SCALE: f64 = 10.0;

/// What an external scorer sees of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk_id: usize,
    pub summary: String,
    pub node_count: usize,
    pub estimated_bytes: usize,
}

impl From<&ChunkIndexEntry> for ChunkSummary {
    fn from(entry: &ChunkIndexEntry) -> Self {
        Self {
            chunk_id: entry.chunk_id,
            summary: entry.summary.clone().unwrap_or_default(),
            node_count: entry.node_count(),
            estimated_bytes: entry.estimated_bytes,
        }
    }
}

/// Ranks chunks for a task, most relevant first. Typically backed by a model call.
#[async_trait]
pub trait ChunkScorer: Send + Sync {
    async fn rank(
        &self,
        chunks: &[ChunkSummary],
        task_description: Option<&str>,
    ) -> anyhow::Result<Vec<usize>>;
}

#[async_trait]
impl<T: ChunkScorer + ?Sized> ChunkScorer for Arc<T> {
    async fn rank(
        &self,
        chunks: &[ChunkSummary],
        task_description: Option<&str>,
    ) -> anyhow::Result<Vec<usize>> {
        (**self).rank(chunks, task_description).await
    }
}

#[must_use]
pub const fn kind_weight(kind: NodeKind) -> f64 {
    match kind {
        NodeKind::Text => 3.0,
        NodeKind::Instance | NodeKind::Component | NodeKind::ComponentSet => 2.0,
        NodeKind::Frame | NodeKind::Section => 1.5,
        NodeKind::Group => 1.0,
        NodeKind::Rectangle
        | NodeKind::Ellipse
        | NodeKind::Line
        | NodeKind::Star
        | NodeKind::RegularPolygon
        | NodeKind::Unknown => 0.5,
        NodeKind::Vector | NodeKind::BooleanOperation | NodeKind::Slice => 0.2,
        NodeKind::Document | NodeKind::Canvas => 0.1,
    }
}

/// Mean kind weight plus scaled text density.
#[must_use]
pub fn heuristic_score(entry: &ChunkIndexEntry) -> f64 {
    let nodes = entry.node_count();
    if nodes == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean_weight = entry
        .kind_counts
        .iter()
        .map(|count| kind_weight(count.kind) * count.count as f64)
        .sum::<f64>()
        / nodes as f64;
    #[allow(clippy::cast_precision_loss)]
    let density = if entry.estimated_bytes == 0 {
        0.0
    } else {
        entry.text_chars as f64 / entry.estimated_bytes as f64
    };
    mean_weight + density * TEXT_DENSITY_SCALE
}

/// Top `limit` chunk ids by [`heuristic_score`]; equal scores keep chunk order.
#[must_use]
pub fn select_heuristic(entries: &[ChunkIndexEntry], limit: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = entries
        .iter()
        .map(|entry| (entry.chunk_id, heuristic_score(entry)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.into_iter().take(limit).map(|(id, _)| id).collect()
}

/// Picks up to `limit` chunk ids, best first.
///
/// External mode keeps the scorer's order, drops ids that match no entry and repeats, and
/// falls back to the heuristic when no scorer is available or the scorer fails.
pub async fn select(
    entries: &[ChunkIndexEntry],
    mode: SelectionMode,
    limit: usize,
    task_description: Option<&str>,
    scorer: Option<&dyn ChunkScorer>,
) -> Vec<usize> {
    if entries.is_empty() || limit == 0 {
        return Vec::new();
    }

    let scorer = match (mode, scorer) {
        (SelectionMode::Heuristic, _) => return select_heuristic(entries, limit),
        (SelectionMode::ExternalScore, None) => {
            log::warn!("external_score selection requested without a scorer; using heuristic");
            return select_heuristic(entries, limit);
        }
        (SelectionMode::ExternalScore, Some(scorer)) => scorer,
    };

    let summaries: Vec<ChunkSummary> = entries.iter().map(ChunkSummary::from).collect();
    let ranked = match scorer.rank(&summaries, task_description).await {
        Ok(ranked) => ranked,
        Err(err) => {
            log::warn!("chunk scorer failed, using heuristic: {err:#}");
            return select_heuristic(entries, limit);
        }
    };

    let known: HashSet<usize> = entries.iter().map(|entry| entry.chunk_id).collect();
    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(limit.min(entries.len()));
    for id in ranked {
        if selected.len() == limit {
            break;
        }
        if !known.contains(&id) {
            log::debug!("chunk scorer returned unknown chunk id {id}");
            continue;
        }
        if seen.insert(id) {
            selected.push(id);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_protocol::{KindCount, NodeId};

    fn entry(chunk_id: usize, kinds: &[(NodeKind, usize)], text_chars: usize) -> ChunkIndexEntry {
        let count: usize = kinds.iter().map(|(_, n)| n).sum();
        ChunkIndexEntry {
            chunk_id,
            node_ids: (0..count)
                .map(|i| NodeId::new(format!("{chunk_id}:{i}")))
                .collect(),
            min_depth: 0,
            max_depth: 0,
            estimated_bytes: 100 * count,
            summary: Some(format!("chunk {chunk_id}")),
            kind_counts: kinds
                .iter()
                .map(|&(kind, count)| KindCount { kind, count })
                .collect(),
            text_chars,
        }
    }

    struct Fixed(Vec<usize>);

    #[async_trait]
    impl ChunkScorer for Fixed {
        async fn rank(&self, _: &[ChunkSummary], _: Option<&str>) -> anyhow::Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl ChunkScorer for Failing {
        async fn rank(&self, _: &[ChunkSummary], _: Option<&str>) -> anyhow::Result<Vec<usize>> {
            anyhow::bail!("model unavailable")
        }
    }

    #[test]
    fn text_heavy_chunks_rank_first() {
        let entries = vec![
            entry(0, &[(NodeKind::Vector, 4)], 0),
            entry(1, &[(NodeKind::Text, 4)], 200),
            entry(2, &[(NodeKind::Frame, 4)], 0),
        ];
        assert_eq!(select_heuristic(&entries, 3), vec![1, 2, 0]);
    }

    #[test]
    fn ties_prefer_lower_chunk_id() {
        let entries = vec![
            entry(0, &[(NodeKind::Group, 2)], 0),
            entry(1, &[(NodeKind::Group, 2)], 0),
            entry(2, &[(NodeKind::Group, 2)], 0),
        ];
        assert_eq!(select_heuristic(&entries, 2), vec![0, 1]);
    }

    #[test]
    fn kind_weight_table() {
        assert_eq!(kind_weight(NodeKind::Text), 3.0);
        assert_eq!(kind_weight(NodeKind::ComponentSet), 2.0);
        assert_eq!(kind_weight(NodeKind::Section), 1.5);
        assert_eq!(kind_weight(NodeKind::Ellipse), 0.5);
        assert_eq!(kind_weight(NodeKind::Slice), 0.2);
        assert_eq!(kind_weight(NodeKind::Canvas), 0.1);
        assert_eq!(kind_weight(NodeKind::Unknown), 0.5);
    }

    #[tokio::test]
    async fn external_ids_are_filtered_and_deduplicated() {
        let entries: Vec<_> = (0..10)
            .map(|id| entry(id, &[(NodeKind::Frame, 1)], 0))
            .collect();
        let scorer = Fixed(vec![9, 3, 3, 999, 0, 5]);
        let selected = select(
            &entries,
            SelectionMode::ExternalScore,
            3,
            Some("find the login form"),
            Some(&scorer),
        )
        .await;
        assert_eq!(selected, vec![9, 3, 0]);
    }

    #[tokio::test]
    async fn external_mode_falls_back_without_scorer() {
        let entries = vec![
            entry(0, &[(NodeKind::Vector, 1)], 0),
            entry(1, &[(NodeKind::Text, 1)], 10),
        ];
        let selected = select(&entries, SelectionMode::ExternalScore, 1, None, None).await;
        assert_eq!(selected, vec![1]);

        let selected =
            select(&entries, SelectionMode::ExternalScore, 1, None, Some(&Failing)).await;
        assert_eq!(selected, vec![1]);
    }

    #[tokio::test]
    async fn empty_entries_select_nothing() {
        let scorer = Fixed(vec![0, 1]);
        assert!(select(&[], SelectionMode::ExternalScore, 5, None, Some(&scorer))
            .await
            .is_empty());
        assert!(select(&[], SelectionMode::Heuristic, 5, None, None)
            .await
            .is_empty());
    }
}
