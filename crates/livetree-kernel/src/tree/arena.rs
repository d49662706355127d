//! Arena storage and structural helpers
//!
//! Nodes live in a `petgraph` [`StableGraph`]. An edge `parent → child`
//! expresses ownership and carries the child's slot index; the child's
//! `parent` field is the non-owning back reference. Handles stay valid when
//! other nodes are removed.
//!
//! All helpers here operate on a borrowed arena, so callers decide which
//! lock they hold.

use super::node::TaskNode;
use crate::types::{Logical, NodeHandle};
use petgraph::stable_graph::{EdgeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};

/// Node storage shared by the active tree and staged candidates
pub type Arena = StableGraph<TaskNode, usize, Directed, u32>;

/// Visitor decision in [`traverse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit<A> {
    /// Recurse into the children, handing them this accumulator
    Descend(A),
    /// Stop recursing this branch
    Prune,
}

/// Children of `parent` as `(slot, handle)` in slot order
#[must_use]
pub fn child_slots(arena: &Arena, parent: NodeHandle) -> Vec<(usize, NodeHandle)> {
    let mut slots: Vec<(usize, NodeHandle)> = arena
        .edges_directed(parent, Direction::Outgoing)
        .map(|e| (*e.weight(), e.target()))
        .collect();
    slots.sort_by_key(|(slot, _)| *slot);
    slots
}

/// Children of `parent` in slot order
#[must_use]
pub fn children(arena: &Arena, parent: NodeHandle) -> Vec<NodeHandle> {
    child_slots(arena, parent).into_iter().map(|(_, h)| h).collect()
}

/// Ownership edge from `parent` to `child` and its slot
#[must_use]
pub fn slot_of(arena: &Arena, parent: NodeHandle, child: NodeHandle) -> Option<(EdgeIndex, usize)> {
    let edge = arena.find_edge(parent, child)?;
    arena.edge_weight(edge).map(|slot| (edge, *slot))
}

/// Pre-order handles of the subtree rooted at `root`
#[must_use]
pub fn subtree(arena: &Arena, root: NodeHandle) -> Vec<NodeHandle> {
    let mut out = Vec::new();
    traverse(arena, root, (), |handle, _, ()| {
        out.push(handle);
        Visit::Descend(())
    });
    out
}

/// Ancestors of `node`, nearest first
#[must_use]
pub fn ancestors(arena: &Arena, node: NodeHandle) -> Vec<NodeHandle> {
    let mut out = Vec::new();
    let mut current = arena.node_weight(node).and_then(|n| n.parent);
    while let Some(handle) = current {
        out.push(handle);
        current = arena.node_weight(handle).and_then(|n| n.parent);
    }
    out
}

/// Generic pre-order traversal.
///
/// The visitor sees each node with the accumulator its parent returned and
/// decides whether to descend. Returns the root's accumulator, or `None` if
/// the root was pruned or does not exist.
pub fn traverse<A, F>(arena: &Arena, root: NodeHandle, acc: A, mut visitor: F) -> Option<A>
where
    A: Clone,
    F: FnMut(NodeHandle, &TaskNode, &A) -> Visit<A>,
{
    let node = arena.node_weight(root)?;
    let Visit::Descend(root_acc) = visitor(root, node, &acc) else {
        return None;
    };

    let mut stack: Vec<(NodeHandle, A)> = children(arena, root)
        .into_iter()
        .rev()
        .map(|c| (c, root_acc.clone()))
        .collect();

    while let Some((handle, inherited)) = stack.pop() {
        let Some(node) = arena.node_weight(handle) else {
            continue;
        };
        if let Visit::Descend(next) = visitor(handle, node, &inherited) {
            for child in children(arena, handle).into_iter().rev() {
                stack.push((child, next.clone()));
            }
        }
    }

    Some(root_acc)
}

/// Current result of a node: a composite's expression over its children,
/// or a leaf's committed value
#[must_use]
pub fn evaluate(arena: &Arena, handle: NodeHandle) -> Logical {
    let Some(node) = arena.node_weight(handle) else {
        return Logical::Unknown;
    };
    match &node.decl.kind {
        crate::decl::DeclKind::Composite { expression, .. } => {
            let kids: Vec<(&str, Logical)> = children(arena, handle)
                .into_iter()
                .filter_map(|c| arena.node_weight(c))
                .map(|c| (c.id(), c.runtime.logical()))
                .collect();
            expression.evaluate(&|id: &str| {
                kids.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
            })
        }
        crate::decl::DeclKind::Leaf { .. } => node.runtime.logical(),
    }
}

/// Recompute composite results from `start` up to its root.
///
/// Stops at the first released node.
pub fn propagate(arena: &Arena, start: NodeHandle) {
    let mut current = Some(start);
    while let Some(handle) = current {
        let Some(node) = arena.node_weight(handle) else {
            return;
        };
        if node.is_composite() {
            let value = evaluate(arena, handle);
            if !node.runtime.set(value) {
                return;
            }
        }
        current = node.parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{DeclKind, Expr, LeafCheck, NodeDecl, NodeSettings};
    use crate::path::TreePath;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn decl(id: &str, kind: DeclKind) -> Arc<NodeDecl> {
        Arc::new(NodeDecl {
            id: id.into(),
            name: id.into(),
            settings: NodeSettings::default(),
            kind,
            attributes: BTreeMap::new(),
        })
    }

    fn leaf(id: &str) -> Arc<NodeDecl> {
        decl(
            id,
            DeclKind::Leaf {
                check: LeafCheck::Constant(Logical::True),
            },
        )
    }

    /// root{a{x,y}, z}
    fn sample() -> (Arena, NodeHandle) {
        let mut arena = Arena::default();
        let root_path = TreePath::root("root");
        let root = arena.add_node(TaskNode::new(
            decl(
                "root",
                DeclKind::Composite {
                    expression: Expr::all_of(["a", "z"]),
                    children: vec!["a".into(), "z".into()],
                },
            ),
            root_path.clone(),
            None,
        ));
        let a = arena.add_node(TaskNode::new(
            decl(
                "a",
                DeclKind::Composite {
                    expression: Expr::all_of(["x", "y"]),
                    children: vec!["x".into(), "y".into()],
                },
            ),
            root_path.child("a"),
            Some(root),
        ));
        let z = arena.add_node(TaskNode::new(leaf("z"), root_path.child("z"), Some(root)));
        let x = arena.add_node(TaskNode::new(leaf("x"), root_path.child("a").child("x"), Some(a)));
        let y = arena.add_node(TaskNode::new(leaf("y"), root_path.child("a").child("y"), Some(a)));
        // inserted out of order on purpose
        arena.add_edge(root, z, 1);
        arena.add_edge(root, a, 0);
        arena.add_edge(a, y, 1);
        arena.add_edge(a, x, 0);
        (arena, root)
    }

    fn ids(arena: &Arena, handles: &[NodeHandle]) -> Vec<String> {
        handles.iter().map(|h| arena[*h].id().to_string()).collect()
    }

    #[test]
    fn children_follow_slot_order() {
        let (arena, root) = sample();
        assert_eq!(ids(&arena, &children(&arena, root)), vec!["a", "z"]);
    }

    #[test]
    fn subtree_is_preorder() {
        let (arena, root) = sample();
        assert_eq!(ids(&arena, &subtree(&arena, root)), vec!["root", "a", "x", "y", "z"]);
    }

    #[test]
    fn traverse_prunes_branch() {
        let (arena, root) = sample();
        let mut seen = Vec::new();
        let result = traverse(&arena, root, 0usize, |_, node, depth| {
            seen.push(format!("{}@{depth}", node.id()));
            if node.id() == "a" {
                Visit::Prune
            } else {
                Visit::Descend(depth + 1)
            }
        });
        assert_eq!(result, Some(1));
        assert_eq!(seen, vec!["root@0", "a@1", "z@1"]);
    }

    #[test]
    fn traverse_pruned_root_returns_none() {
        let (arena, root) = sample();
        assert_eq!(traverse(&arena, root, (), |_, _, ()| Visit::<()>::Prune), None);
    }

    #[test]
    fn propagate_recomputes_ancestors() {
        let (arena, root) = sample();
        for h in subtree(&arena, root) {
            if !arena[h].is_composite() {
                arena[h].runtime.set(Logical::True);
            }
        }
        let x = subtree(&arena, root)[2];
        propagate(&arena, arena[x].parent.unwrap());
        assert_eq!(arena[root].runtime.logical(), Logical::True);

        arena[x].runtime.set(Logical::False);
        propagate(&arena, arena[x].parent.unwrap());
        assert_eq!(arena[root].runtime.logical(), Logical::False);
    }

    #[test]
    fn ancestors_nearest_first() {
        let (arena, root) = sample();
        let x = subtree(&arena, root)[2];
        assert_eq!(ids(&arena, &ancestors(&arena, x)), vec!["a", "root"]);
        assert_eq!(slot_of(&arena, root, x), None);
    }
}
