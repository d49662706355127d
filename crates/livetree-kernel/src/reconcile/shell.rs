//! Cleanup of everything a pass leaves behind
//!
//! The candidate tree donates nodes during a pass. Whatever it still owns
//! afterwards (its root when unchanged, unchanged subtrees, donors swapped
//! out for placeholders) never ran and is discarded without lifecycle
//! calls. Active nodes detached by a splice that failed before disposing
//! them did run, so they are disposed through the lifecycle.
//!
//! The shell does this on drop, so early returns clean up too.

use crate::lifecycle::NodeLifecycle;
use crate::tree::arena::{slot_of, subtree};
use crate::tree::node::NodeView;
use crate::tree::TaskTree;
use crate::types::NodeHandle;

/// Detach `root` from its parent and dispose its whole subtree.
///
/// Each node is released exactly once; `lifecycle` is told about every
/// node this call released. Returns how many nodes that was.
pub(crate) fn dispose_subtree(
    tree: &TaskTree,
    lifecycle: Option<&dyn NodeLifecycle>,
    root: NodeHandle,
) -> usize {
    let views: Vec<NodeView> = {
        let mut arena = tree.write();
        let Some(node) = arena.node_weight(root) else {
            return 0;
        };
        if let Some(parent) = node.parent {
            if let Some((edge, _)) = slot_of(&arena, parent, root) {
                arena.remove_edge(edge);
            }
        }
        subtree(&arena, root)
            .into_iter()
            .map(|h| arena[h].view(h))
            .collect()
    };

    let mut released = 0;
    for view in &views {
        if view.runtime.release() {
            if let Some(lifecycle) = lifecycle {
                lifecycle.dispose(view);
            }
            released += 1;
        }
    }

    let mut arena = tree.write();
    for view in &views {
        let same = arena
            .node_weight(view.node.handle)
            .is_some_and(|n| n.instance == view.node.instance);
        if same {
            arena.remove_node(view.node.handle);
        }
    }
    released
}

/// Leftovers of one reconciliation pass
pub(crate) struct CandidateShell<'a> {
    tree: &'a TaskTree,
    lifecycle: &'a dyn NodeLifecycle,
    candidate_root: NodeHandle,
    donors: Vec<NodeHandle>,
    orphans: Vec<NodeHandle>,
    finished: bool,
}

impl<'a> CandidateShell<'a> {
    pub(crate) fn new(tree: &'a TaskTree, lifecycle: &'a dyn NodeLifecycle, candidate_root: NodeHandle) -> Self {
        Self {
            tree,
            lifecycle,
            candidate_root,
            donors: Vec::new(),
            orphans: Vec::new(),
            finished: false,
        }
    }

    /// Keep a detached candidate child until the pass ends
    pub(crate) fn add_donors(&mut self, donors: impl IntoIterator<Item = NodeHandle>) {
        self.donors.extend(donors);
    }

    /// Track a detached active node until it is disposed
    pub(crate) fn adopt_orphan(&mut self, node: NodeHandle) {
        self.orphans.push(node);
    }

    /// The orphan was disposed by its splice
    pub(crate) fn release_orphan(&mut self, node: NodeHandle) {
        self.orphans.retain(|h| *h != node);
    }

    /// Dispose orphans and discard the candidate remnants.
    ///
    /// Returns `(disposed, discarded)` node counts.
    pub(crate) fn finish(&mut self) -> (usize, usize) {
        if self.finished {
            return (0, 0);
        }
        self.finished = true;

        let mut disposed = 0;
        for orphan in std::mem::take(&mut self.orphans) {
            disposed += dispose_subtree(self.tree, Some(self.lifecycle), orphan);
        }

        let mut discarded = 0;
        let remnants = std::iter::once(self.candidate_root).chain(std::mem::take(&mut self.donors));
        for remnant in remnants {
            if remnant != self.tree.root() {
                discarded += dispose_subtree(self.tree, None, remnant);
            }
        }
        tracing::debug!(disposed, discarded, "candidate shell released");
        (disposed, discarded)
    }
}

impl Drop for CandidateShell<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
