//! Path → node lookup built per reconciliation pass

use crate::path::TreePath;
use crate::tree::arena::{traverse, Arena, Visit};
use crate::types::NodeHandle;
use std::collections::HashMap;

/// Index of every node reachable from a root, keyed by path
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    by_path: HashMap<TreePath, NodeHandle>,
}

impl GraphIndex {
    /// Index the tree at `root` in a single traversal.
    ///
    /// Paths are unique by construction; on a duplicate the later node wins.
    #[must_use]
    pub fn build(arena: &Arena, root: NodeHandle) -> Self {
        let mut by_path = HashMap::new();
        traverse(arena, root, (), |handle, node, ()| {
            by_path.insert(node.path.clone(), handle);
            Visit::Descend(())
        });
        Self { by_path }
    }

    /// Node at `path`
    #[inline]
    #[must_use]
    pub fn get(&self, path: &TreePath) -> Option<NodeHandle> {
        self.by_path.get(path).copied()
    }

    /// Whether `path` is indexed
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &TreePath) -> bool {
        self.by_path.contains_key(path)
    }

    /// Number of indexed nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether nothing is indexed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Indexed paths, unordered
    pub fn paths(&self) -> impl Iterator<Item = &TreePath> {
        self.by_path.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::decl::CheckSpec;
    use crate::spec::NodeSpec;

    #[test]
    fn index_covers_every_node() {
        let check = CheckSpec::new("toggle", serde_json::Value::Null);
        let spec = NodeSpec::composite(
            "root",
            vec![
                NodeSpec::composite("a", vec![NodeSpec::leaf("x", check.clone())]),
                NodeSpec::leaf("z", check),
            ],
        );
        let mut arena = Arena::default();
        let root = build(&mut arena, &spec).unwrap();
        let index = GraphIndex::build(&arena, root);

        assert_eq!(index.len(), 4);
        let x = index.get(&"root/a/x".parse().unwrap()).unwrap();
        assert_eq!(arena[x].id(), "x");
        assert_eq!(index.get(&TreePath::root("root")), Some(root));
        assert!(!index.contains(&"root/x".parse().unwrap()));
    }

    #[test]
    fn dangling_root_gives_empty_index() {
        let arena = Arena::default();
        let index = GraphIndex::build(&arena, NodeHandle::new(7));
        assert!(index.is_empty());
    }
}
