//! Serializable point-in-time view of a tree

use crate::path::TreePath;
use crate::tree::arena::{children, Arena};
use crate::types::{InstanceId, Logical, NodeHandle};
use serde::Serialize;

/// One node of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    /// Node id
    pub id: String,
    /// Display name
    pub name: String,
    /// Correlation path
    pub path: TreePath,
    /// Runtime identity
    pub instance: InstanceId,
    /// `composite` or `leaf`
    pub kind: &'static str,
    /// Current result
    pub logical: Logical,
    /// View epoch at capture time
    pub view_epoch: u64,
    /// Children in slot order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Find a descendant (or self) by path
    #[must_use]
    pub fn find(&self, path: &TreePath) -> Option<&NodeSnapshot> {
        if &self.path == path {
            return Some(self);
        }
        if !self.path.is_ancestor_of(path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    /// Pre-order iterator over the subtree
    pub fn iter(&self) -> impl Iterator<Item = &NodeSnapshot> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Render as an indented outline
    #[must_use]
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(0, &mut out);
        out
    }

    fn write_outline(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("{} [{}] = {}\n", self.id, self.name, self.logical));
        for child in &self.children {
            child.write_outline(depth + 1, out);
        }
    }
}

/// Snapshot of a whole tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    /// Root node
    pub root: NodeSnapshot,
}

impl TreeSnapshot {
    /// Find a node by path
    #[must_use]
    pub fn find(&self, path: &TreePath) -> Option<&NodeSnapshot> {
        self.root.find(path)
    }

    /// Instance at `path`, if any
    #[must_use]
    pub fn instance_at(&self, path: &str) -> Option<InstanceId> {
        let path: TreePath = path.parse().ok()?;
        self.find(&path).map(|n| n.instance)
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.iter().count()
    }

    /// Always false; a snapshot has at least its root
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Capture the subtree at `root`; `None` if the handle is dangling
pub(crate) fn capture(arena: &Arena, root: NodeHandle) -> Option<TreeSnapshot> {
    capture_node(arena, root).map(|root| TreeSnapshot { root })
}

fn capture_node(arena: &Arena, handle: NodeHandle) -> Option<NodeSnapshot> {
    let node = arena.node_weight(handle)?;
    let state = node.runtime.state();
    Some(NodeSnapshot {
        id: node.id().to_string(),
        name: node.decl.name.clone(),
        path: node.path.clone(),
        instance: node.instance,
        kind: if node.is_composite() { "composite" } else { "leaf" },
        logical: state.logical,
        view_epoch: state.view_epoch,
        children: children(arena, handle)
            .into_iter()
            .filter_map(|c| capture_node(arena, c))
            .collect(),
    })
}
