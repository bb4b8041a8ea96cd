use crate::error::{ProtocolError, Result};
use crate::node::{DesignNode, NodeId, NodePayload, Snapshot};
use std::collections::HashMap;

/// One arena slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatNode {
    pub payload: NodePayload,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Depth below the arena root (root = 0).
    pub depth: usize,
    /// False when the upstream cut this node off at its fetch depth and its children are not
    /// known yet.
    pub children_loaded: bool,
}

/// Index-addressed arena of a design tree.
///
/// `FlatTree::build` lays slots out in pre-order, so slot order is the canonical walk order.
/// Nodes attached later (incremental fetches) are appended after the initial walk.
#[derive(Debug, Clone, Default)]
pub struct FlatTree {
    nodes: Vec<FlatNode>,
    index: HashMap<NodeId, usize>,
}

impl FlatTree {
    pub fn build(root: &DesignNode) -> Result<Self> {
        let mut tree = Self::default();
        tree.insert_subtree(root, None, 0, None)?;
        Ok(tree)
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self> {
        Self::build(&snapshot.root)
    }

    /// Builds an arena from a partial fetch: nodes `fetched_levels` below `root` have unknown
    /// children unless their kind can never have any.
    pub fn build_partial(root: &DesignNode, fetched_levels: usize) -> Result<Self> {
        let mut tree = Self::default();
        tree.insert_subtree(root, None, 0, Some(fetched_levels))?;
        Ok(tree)
    }

    /// Attaches freshly fetched children under `parent`. Children whose id is already present
    /// are skipped. Returns the slots of the newly attached direct children, in order.
    pub fn attach_children(
        &mut self,
        parent: usize,
        children: &[DesignNode],
        fetched_levels: usize,
    ) -> Result<Vec<usize>> {
        let parent_depth = self
            .nodes
            .get(parent)
            .map(|node| node.depth)
            .ok_or(ProtocolError::SlotOutOfRange(parent))?;

        let mut attached = Vec::with_capacity(children.len());
        for child in children {
            if self.index.contains_key(&child.id) {
                continue;
            }
            // Relative budget: the child itself sits one level below the fetched node.
            let levels = fetched_levels.saturating_sub(1);
            let slot =
                self.insert_subtree(child, Some(parent), parent_depth + 1, Some(levels))?;
            attached.push(slot);
        }
        self.nodes[parent].children_loaded = true;
        Ok(attached)
    }

    fn insert_subtree(
        &mut self,
        root: &DesignNode,
        parent: Option<usize>,
        depth: usize,
        fetched_levels: Option<usize>,
    ) -> Result<usize> {
        let first_slot = self.nodes.len();
        // (node, parent slot, absolute depth, relative depth)
        let mut stack: Vec<(&DesignNode, Option<usize>, usize, usize)> =
            vec![(root, parent, depth, 0)];

        while let Some((node, parent, depth, relative)) = stack.pop() {
            if !node.id.is_well_formed() {
                return Err(ProtocolError::InvalidNodeId(node.id.0.clone()));
            }
            if self.index.contains_key(&node.id) {
                return Err(ProtocolError::DuplicateNodeId(node.id.clone()));
            }

            let at_fetch_edge = fetched_levels.is_some_and(|levels| relative >= levels);
            let children_loaded =
                !at_fetch_edge || !node.children.is_empty() || !node.kind.is_container();

            let slot = self.nodes.len();
            self.nodes.push(FlatNode {
                payload: node.payload(),
                parent,
                children: Vec::with_capacity(node.children.len()),
                depth,
                children_loaded,
            });
            self.index.insert(node.id.clone(), slot);
            if let Some(parent) = parent {
                self.nodes[parent].children.push(slot);
            }

            for child in node.children.iter().rev() {
                stack.push((child, Some(slot), depth + 1, relative + 1));
            }
        }

        Ok(first_slot)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&FlatNode> {
        self.nodes.get(slot)
    }

    #[must_use]
    pub fn slot_of(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Slots in arena order (pre-order for a fully built tree).
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FlatNode)> {
        self.nodes.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use pretty_assertions::assert_eq;

    fn sample() -> DesignNode {
        DesignNode::new("0:0", NodeKind::Canvas).with_children(vec![
            DesignNode::new("1:0", NodeKind::Frame).with_children(vec![
                DesignNode::new("1:1", NodeKind::Text),
                DesignNode::new("1:2", NodeKind::Rectangle),
            ]),
            DesignNode::new("2:0", NodeKind::Frame),
        ])
    }

    #[test]
    fn build_lays_out_pre_order() {
        let tree = FlatTree::build(&sample()).unwrap();
        let ids: Vec<&str> = tree.iter().map(|(_, n)| n.payload.id.as_str()).collect();
        assert_eq!(ids, vec!["0:0", "1:0", "1:1", "1:2", "2:0"]);
        assert_eq!(tree.get(0).unwrap().children, vec![1, 4]);
        assert_eq!(tree.get(2).unwrap().depth, 2);
        assert_eq!(tree.get(4).unwrap().parent, Some(0));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let root = DesignNode::new("0:0", NodeKind::Frame).with_children(vec![
            DesignNode::new("1:0", NodeKind::Text),
            DesignNode::new("1:0", NodeKind::Text),
        ]);
        assert!(matches!(
            FlatTree::build(&root),
            Err(ProtocolError::DuplicateNodeId(_))
        ));
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let mut node = DesignNode::new("leaf", NodeKind::Rectangle);
        for depth in (0..50_000).rev() {
            node = DesignNode::new(format!("n{depth}"), NodeKind::Group).with_children(vec![node]);
        }
        let tree = FlatTree::build(&node).unwrap();
        assert_eq!(tree.len(), 50_001);
        assert_eq!(tree.get(tree.len() - 1).unwrap().depth, 50_000);
    }

    #[test]
    fn partial_build_marks_fetch_edge() {
        let tree = FlatTree::build_partial(&sample(), 1).unwrap();
        // 1:0 has children in the payload, so they are known.
        assert!(tree.get(1).unwrap().children_loaded);
        // 2:0 is a childless frame at the fetch edge: unknown.
        assert!(!tree.get(4).unwrap().children_loaded);
        // Text never has children.
        assert!(tree.get(2).unwrap().children_loaded);
    }

    #[test]
    fn attach_children_skips_known_ids() {
        let mut tree = FlatTree::build_partial(&DesignNode::new("0:0", NodeKind::Frame), 0).unwrap();
        assert!(!tree.get(0).unwrap().children_loaded);
        let attached = tree
            .attach_children(
                0,
                &[
                    DesignNode::new("0:0", NodeKind::Frame),
                    DesignNode::new("0:1", NodeKind::Frame),
                ],
                1,
            )
            .unwrap();
        assert_eq!(attached, vec![1]);
        assert!(tree.get(0).unwrap().children_loaded);
        assert!(!tree.get(1).unwrap().children_loaded);
        assert_eq!(tree.get(1).unwrap().depth, 1);
    }
}
