//! Child correlation for a composite about to be replaced
//!
//! Direct children of the candidate that equal a direct child of the active
//! node are swapped, inside the candidate, for inert placeholders carrying
//! the active child's last known result. The swapped-out candidate children
//! become donors: detached, kept alive until the pass ends so the walk can
//! still correlate the relocated children's subtrees against them.

use crate::decl::NodeDecl;
use crate::equality::nodes_equal;
use crate::tree::arena::{child_slots, slot_of, Arena};
use crate::tree::node::{NodeRuntime, TaskNode};
use crate::types::NodeHandle;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Active child slot → candidate child slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correspondence {
    pairs: BTreeMap<usize, usize>,
}

impl Correspondence {
    /// Candidate slot matched to an active slot
    #[inline]
    #[must_use]
    pub fn get(&self, active_slot: usize) -> Option<usize> {
        self.pairs.get(&active_slot).copied()
    }

    /// Number of matched children
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no child survived
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `(active slot, candidate slot)` pairs in active order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs.iter().map(|(a, c)| (*a, *c))
    }
}

/// Result of correlating the children of one replaced composite
#[derive(Debug, Default)]
pub struct ChildMatch {
    /// Which active children survive, and where they go
    pub correspondence: Correspondence,
    /// Placeholders by candidate slot
    pub placeholders: BTreeMap<usize, NodeHandle>,
    /// Detached candidate children the placeholders replaced
    pub donors: Vec<NodeHandle>,
}

/// Correlate the direct children of `active` and `candidate`.
///
/// Each candidate child takes the first unmatched equal active child.
/// Nothing happens unless both nodes are composites.
pub fn correlate_children(arena: &mut Arena, active: NodeHandle, candidate: NodeHandle) -> ChildMatch {
    let mut result = ChildMatch::default();
    let both_composite = arena.node_weight(active).is_some_and(TaskNode::is_composite)
        && arena.node_weight(candidate).is_some_and(TaskNode::is_composite);
    if !both_composite {
        return result;
    }

    let active_slots = child_slots(arena, active);
    let mut pairs = BTreeMap::new();
    let mut found: Vec<(usize, NodeHandle, NodeHandle)> = Vec::new();

    for (cand_slot, cand_child) in child_slots(arena, candidate) {
        let hit = active_slots.iter().find(|(slot, act_child)| {
            !pairs.contains_key(slot) && nodes_equal(&arena[*act_child], &arena[cand_child])
        });
        if let Some((act_slot, act_child)) = hit {
            pairs.insert(*act_slot, cand_slot);
            found.push((cand_slot, *act_child, cand_child));
        }
    }

    for (cand_slot, act_child, cand_child) in found {
        let value = arena[act_child].runtime.last_known();
        if let Some((edge, _)) = slot_of(arena, candidate, cand_child) {
            arena.remove_edge(edge);
        }
        arena[cand_child].parent = None;

        let mut placeholder = TaskNode::new(
            Arc::new(NodeDecl::placeholder(arena[cand_child].id(), value)),
            arena[cand_child].path.clone(),
            Some(candidate),
        );
        placeholder.runtime = Arc::new(NodeRuntime::with_value(value));
        let handle = arena.add_node(placeholder);
        arena.add_edge(candidate, handle, cand_slot);

        result.placeholders.insert(cand_slot, handle);
        result.donors.push(cand_child);
    }

    result.correspondence = Correspondence { pairs };
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::decl::{CheckSpec, DeclKind, LeafCheck};
    use crate::spec::NodeSpec;
    use crate::tree::arena::children;
    use crate::types::Logical;

    fn leaf(id: &str, value: bool) -> NodeSpec {
        NodeSpec::leaf(id, CheckSpec::new("constant", serde_json::json!({ "value": value })))
    }

    fn pair(active: NodeSpec, candidate: NodeSpec) -> (Arena, NodeHandle, NodeHandle) {
        let mut arena = Arena::default();
        let a = build(&mut arena, &active).unwrap();
        let c = build(&mut arena, &candidate).unwrap();
        (arena, a, c)
    }

    #[test]
    fn equal_children_swapped_for_placeholders() {
        let (mut arena, a, c) = pair(
            NodeSpec::composite("a", vec![leaf("x", true), leaf("y", true), leaf("z", true)]),
            NodeSpec::composite("a", vec![leaf("x", true), leaf("y2", false), leaf("z", true)]),
        );
        let active_kids = children(&arena, a);
        arena[active_kids[0]].runtime.set(Logical::True);
        arena[active_kids[2]].runtime.set(Logical::False);

        let m = correlate_children(&mut arena, a, c);
        assert_eq!(m.correspondence.iter().collect::<Vec<_>>(), vec![(0, 0), (2, 2)]);
        assert_eq!(m.donors.len(), 2);
        for donor in &m.donors {
            assert!(arena[*donor].parent.is_none());
        }

        let cand_kids = children(&arena, c);
        assert_eq!(cand_kids.len(), 3);
        assert_eq!(cand_kids[0], m.placeholders[&0]);
        let placeholder = &arena[cand_kids[0]];
        assert_eq!(placeholder.id(), "x");
        assert_eq!(placeholder.path.to_string(), "a/x");
        assert_eq!(placeholder.runtime.logical(), Logical::True);
        assert_eq!(
            placeholder.decl.kind,
            DeclKind::Leaf {
                check: LeafCheck::Constant(Logical::True)
            }
        );
        assert_eq!(arena[cand_kids[2]].runtime.logical(), Logical::False);
        assert_eq!(arena[cand_kids[1]].id(), "y2");
    }

    #[test]
    fn match_ignores_position() {
        let (mut arena, a, c) = pair(
            NodeSpec::composite("a", vec![leaf("x", true), leaf("y", true)]),
            NodeSpec::composite("a", vec![leaf("y", true), leaf("x", true)]),
        );
        let m = correlate_children(&mut arena, a, c);
        assert_eq!(m.correspondence.get(0), Some(1));
        assert_eq!(m.correspondence.get(1), Some(0));
    }

    #[test]
    fn changed_children_are_not_matched() {
        let (mut arena, a, c) = pair(
            NodeSpec::composite("a", vec![leaf("x", true)]),
            NodeSpec::composite("a", vec![leaf("x", false)]),
        );
        let m = correlate_children(&mut arena, a, c);
        assert!(m.correspondence.is_empty());
        assert!(m.donors.is_empty());
    }

    #[test]
    fn leaf_pairs_have_no_correspondence() {
        let (mut arena, a, c) = pair(leaf("x", true), NodeSpec::composite("x", vec![leaf("y", true)]));
        let m = correlate_children(&mut arena, a, c);
        assert!(m.correspondence.is_empty());
        assert_eq!(children(&arena, c).len(), 1);
    }
}
