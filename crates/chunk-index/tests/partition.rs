use pretty_assertions::assert_eq;
use relay_chunk_index::{build, build_flat, chunk_payload, SUMMARY_MAX_CHARS};
use relay_protocol::{DesignNode, FlatTree, NodeAttributes, NodeId, NodeKind, Snapshot};
use std::collections::HashSet;

/// Irregular tree: fan-out and depth vary with a fixed LCG so runs are reproducible.
fn synthetic_tree(target_nodes: usize) -> Snapshot {
    let mut seed: u64 = 0x5eed;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 33) as usize
    };

    let kinds = [
        NodeKind::Frame,
        NodeKind::Text,
        NodeKind::Group,
        NodeKind::Rectangle,
        NodeKind::Instance,
        NodeKind::Vector,
    ];

    // Arena of (node, child indices); assembled bottom-up at the end.
    let mut nodes: Vec<(DesignNode, Vec<usize>)> =
        vec![(DesignNode::new("0:0", NodeKind::Canvas), Vec::new())];
    let mut open = vec![0usize];
    while nodes.len() < target_nodes {
        let parent = open[next() % open.len()];
        let index = nodes.len();
        let kind = kinds[next() % kinds.len()];
        let node = DesignNode::new(format!("{}:{}", index / 100, index % 100), kind)
            .with_attributes(NodeAttributes::named(format!("node {index}")));
        nodes.push((node, Vec::new()));
        nodes[parent].1.push(index);
        if kind.is_container() {
            open.push(index);
        }
    }

    for index in (0..nodes.len()).rev() {
        let child_ids = std::mem::take(&mut nodes[index].1);
        let children = child_ids
            .into_iter()
            .map(|child| {
                std::mem::replace(&mut nodes[child].0, DesignNode::new("", NodeKind::Unknown))
            })
            .collect();
        nodes[index].0.children = children;
    }
    let root = std::mem::replace(&mut nodes[0].0, DesignNode::new("", NodeKind::Unknown));
    Snapshot::new("synthetic", root, 0)
}

fn all_ids(tree: &FlatTree) -> Vec<NodeId> {
    tree.iter().map(|(_, node)| node.payload.id.clone()).collect()
}

#[test]
fn entries_partition_every_node_exactly_once() {
    let snapshot = synthetic_tree(1_337);
    let tree = FlatTree::from_snapshot(&snapshot).unwrap();
    let expected = all_ids(&tree);

    for chunk_size in [1, 7, 60, 500, 1_337, 5_000] {
        let entries = build(&snapshot, chunk_size).unwrap();
        assert_eq!(entries.len(), expected.len().div_ceil(chunk_size));

        let covered: Vec<NodeId> = entries
            .iter()
            .flat_map(|entry| entry.node_ids.iter().cloned())
            .collect();
        assert_eq!(covered, expected, "chunk_size {chunk_size}");
        assert!(entries.iter().all(|entry| entry.node_count() <= chunk_size));
        assert!(entries.iter().enumerate().all(|(i, entry)| entry.chunk_id == i));
    }
}

#[test]
fn build_is_deterministic() {
    let snapshot = synthetic_tree(800);
    let first = serde_json::to_vec(&build(&snapshot, 60).unwrap()).unwrap();
    let second = serde_json::to_vec(&build(&snapshot, 60).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn chunk_get_reconstructs_each_chunk_without_overlap() {
    let snapshot = synthetic_tree(1_000);
    let tree = FlatTree::from_snapshot(&snapshot).unwrap();
    let entries = build_flat(&tree, 60, SUMMARY_MAX_CHARS).unwrap();

    let mut seen: HashSet<NodeId> = HashSet::new();
    for entry in &entries {
        let payload = chunk_payload(&tree, entry).unwrap();
        let ids: Vec<NodeId> = payload.iter().map(|node| node.id.clone()).collect();
        assert_eq!(ids, entry.node_ids);
        for id in ids {
            assert!(seen.insert(id), "node in two chunks");
        }
    }
    assert_eq!(seen.len(), snapshot.node_count());
}
