//! The live task tree
//!
//! [`TaskTree`] owns the arena holding the active tree and any staged
//! candidate trees. Two kinds of actors touch it:
//!
//! - **Background evaluation** (checks, timers) writes runtime fields only,
//!   through [`TaskTree::commit`], under the arena read lock.
//! - **The reconciler** is the single structural writer. It holds the
//!   [`StructuralMutationGuard`] for a whole pass and takes the arena write
//!   lock only for short structural edits.

pub mod arena;
pub mod node;

use crate::builder;
use crate::error::BuildError;
use crate::guard::{StructuralLock, StructuralMutationGuard};
use crate::path::TreePath;
use crate::registry::RegistrySet;
use crate::snapshot::{self, TreeSnapshot};
use crate::spec::TreeSpec;
use crate::types::{Logical, NodeHandle, NodeRef};
use arena::{Arena, Visit};
use node::{NodeView, TaskNode};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome of a runtime write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Value stored and propagated
    Applied,
    /// Node gone, replaced or released; value dropped
    Ignored,
}

/// Live task tree plus staging area for candidates
#[derive(Debug)]
pub struct TaskTree {
    arena: RwLock<Arena>,
    root: NodeHandle,
    structure: StructuralLock,
}

impl TaskTree {
    /// Build the active tree
    ///
    /// # Errors
    /// Returns error if the tree description is inconsistent
    pub fn from_spec(spec: &TreeSpec) -> Result<Self, BuildError> {
        let mut arena = Arena::default();
        let root = builder::build(&mut arena, &spec.root)?;
        tracing::info!(root = %spec.root.id, nodes = arena.node_count(), "task tree created");
        Ok(Self {
            arena: RwLock::new(arena),
            root,
            structure: StructuralLock::new(),
        })
    }

    /// Build a candidate tree next to the active one and return its root.
    ///
    /// The candidate is detached and never evaluated until reconciliation
    /// donates parts of it.
    ///
    /// # Errors
    /// Returns error if the tree description is inconsistent
    pub fn stage(&self, spec: &TreeSpec) -> Result<NodeHandle, BuildError> {
        let mut arena = self.arena.write();
        builder::build(&mut arena, &spec.root)
    }

    /// Remove a staged tree that will not be reconciled
    pub fn discard(&self, staged: NodeHandle) {
        if staged == self.root {
            return;
        }
        let mut arena = self.arena.write();
        for handle in arena::subtree(&arena, staged) {
            if let Some(node) = arena.remove_node(handle) {
                node.runtime.release();
            }
        }
    }

    /// Root of the active tree; never changes
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write()
    }

    /// Enter a structural mutation scope
    pub fn lock_structure(&self) -> StructuralMutationGuard<'_> {
        self.structure.lock()
    }

    /// Whether a structural mutation is in progress
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.structure.is_held()
    }

    /// Handle of `node` if it still holds that instance and is not released
    #[must_use]
    pub fn resolve(&self, node: NodeRef) -> Option<NodeHandle> {
        let arena = self.arena.read();
        resolve_in(&arena, node)
    }

    /// Whether `handle` is reachable from the active root
    #[must_use]
    pub fn is_attached(&self, handle: NodeHandle) -> bool {
        let arena = self.arena.read();
        handle == self.root || arena::ancestors(&arena, handle).last() == Some(&self.root)
    }

    /// View of a node
    #[must_use]
    pub fn view(&self, handle: NodeHandle) -> Option<NodeView> {
        self.arena.read().node_weight(handle).map(|n| n.view(handle))
    }

    /// View of the active node at `path`
    #[must_use]
    pub fn view_at(&self, path: &TreePath) -> Option<NodeView> {
        let arena = self.arena.read();
        let mut found = None;
        arena::traverse(&arena, self.root, (), |handle, node, ()| {
            if found.is_some() || !node.path.is_prefix_of(path) {
                return Visit::Prune;
            }
            if &node.path == path {
                found = Some(node.view(handle));
                return Visit::Prune;
            }
            Visit::Descend(())
        });
        found
    }

    /// Children of a node in slot order
    #[must_use]
    pub fn children(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        arena::children(&self.arena.read(), handle)
    }

    /// Copy of a composite's registries, for diagnostics
    #[must_use]
    pub fn registries(&self, handle: NodeHandle) -> Option<RegistrySet> {
        self.arena
            .read()
            .node_weight(handle)
            .and_then(TaskNode::registries)
            .cloned()
    }

    /// Pre-order traversal under the read lock.
    ///
    /// The visitor must not call back into methods taking the write lock.
    pub fn traverse<A, F>(&self, root: NodeHandle, acc: A, visitor: F) -> Option<A>
    where
        A: Clone,
        F: FnMut(NodeHandle, &TaskNode, &A) -> Visit<A>,
    {
        arena::traverse(&self.arena.read(), root, acc, visitor)
    }

    /// Nodes in the active tree
    #[must_use]
    pub fn len(&self) -> usize {
        arena::subtree(&self.arena.read(), self.root).len()
    }

    /// Always false; the root cannot be removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Nodes in the arena, staged candidates included
    #[must_use]
    pub fn arena_len(&self) -> usize {
        self.arena.read().node_count()
    }

    /// Store a result for `node` and re-evaluate its ancestors.
    ///
    /// Safe to call from any thread at any time; writes aimed at removed,
    /// replaced or released nodes are dropped.
    pub fn commit(&self, node: NodeRef, value: Logical) -> Commit {
        let arena = self.arena.read();
        let Some(handle) = resolve_in(&arena, node) else {
            return Commit::Ignored;
        };
        let target = &arena[handle];
        if !target.runtime.set(value) {
            return Commit::Ignored;
        }
        if let Some(parent) = target.parent {
            arena::propagate(&arena, parent);
        }
        Commit::Applied
    }

    /// Record an event fired by `node`
    pub fn fire(&self, node: NodeRef, event: &str) -> Commit {
        let arena = self.arena.read();
        match resolve_in(&arena, node) {
            Some(handle) if arena[handle].runtime.fire(event) => Commit::Applied,
            _ => Commit::Ignored,
        }
    }

    /// Re-evaluate `handle` and its ancestors
    pub fn refresh(&self, handle: NodeHandle) {
        arena::propagate(&self.arena.read(), handle);
    }

    /// Consistent snapshot; waits for any structural mutation to finish
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        let _guard = self.structure.lock();
        self.capture()
    }

    /// Snapshot unless another thread is restructuring the tree
    #[must_use]
    pub fn try_snapshot(&self) -> Option<TreeSnapshot> {
        let _guard = self.structure.try_lock()?;
        Some(self.capture())
    }

    fn capture(&self) -> TreeSnapshot {
        let arena = self.arena.read();
        snapshot::capture(&arena, self.root).unwrap_or_else(|| unreachable!("active root is never removed"))
    }
}

pub(crate) fn resolve_in(arena: &Arena, node: NodeRef) -> Option<NodeHandle> {
    arena
        .node_weight(node.handle)
        .filter(|n| n.instance == node.instance && !n.runtime.is_released())
        .map(|_| node.handle)
}
