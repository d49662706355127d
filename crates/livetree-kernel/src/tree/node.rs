//! Node records stored in the arena

use crate::decl::NodeDecl;
use crate::path::TreePath;
use crate::registry::RegistrySet;
use crate::types::{InstanceId, Logical, NodeHandle, NodeRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Variant-specific node payload
#[derive(Debug, Clone)]
pub enum NodeBody {
    /// Owns children (through arena edges) and a registry set
    Composite(Box<RegistrySet>),
    /// Childless
    Leaf,
}

/// Mutable runtime fields, the only part of a node background activity
/// writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeState {
    /// Last committed result, `Unknown` when cleared
    pub logical: Logical,
    /// Last result that was not `Unknown`
    pub last_known: Logical,
    /// Last event fired by the node
    pub last_event: Option<String>,
    /// Bumped whenever presentation bound to the node must refresh
    pub view_epoch: u64,
}

/// Shared runtime cell of a node.
///
/// Held by the arena and by whatever runs the node. Once released, writes
/// are ignored.
#[derive(Debug, Default)]
pub struct NodeRuntime {
    state: Mutex<RuntimeState>,
    released: AtomicBool,
}

impl NodeRuntime {
    /// Fresh runtime with no result
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime pre-seeded with a result
    #[must_use]
    pub fn with_value(value: Logical) -> Self {
        let runtime = Self::new();
        runtime.set(value);
        runtime
    }

    /// Copy of the current state
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.state.lock().clone()
    }

    /// Current result
    #[must_use]
    pub fn logical(&self) -> Logical {
        self.state.lock().logical
    }

    /// Last result that was not `Unknown`
    #[must_use]
    pub fn last_known(&self) -> Logical {
        self.state.lock().last_known
    }

    /// Store a result. Returns `false` once released.
    pub fn set(&self, value: Logical) -> bool {
        if self.is_released() {
            return false;
        }
        let mut state = self.state.lock();
        state.logical = value;
        if value.is_known() {
            state.last_known = value;
        }
        true
    }

    /// Record the last fired event. Returns `false` once released.
    pub fn fire(&self, event: impl Into<String>) -> bool {
        if self.is_released() {
            return false;
        }
        self.state.lock().last_event = Some(event.into());
        true
    }

    /// Forget the current result so the next evaluation recomputes it
    pub fn clear(&self) {
        self.state.lock().logical = Logical::Unknown;
    }

    /// Force dependent views to refresh
    pub fn invalidate(&self) -> u64 {
        let mut state = self.state.lock();
        state.view_epoch += 1;
        state.view_epoch
    }

    /// Mark released. Returns `true` only for the first call.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// Whether the node was released
    #[inline]
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// A node in the arena
#[derive(Debug, Clone)]
pub struct TaskNode {
    /// Configuration-derived state
    pub decl: Arc<NodeDecl>,
    /// Position-derived correlation key
    pub path: TreePath,
    /// Runtime identity
    pub instance: InstanceId,
    /// Non-owning back reference
    pub parent: Option<NodeHandle>,
    /// Runtime cell shared with the run mechanism
    pub runtime: Arc<NodeRuntime>,
    /// Variant payload
    pub body: NodeBody,
}

impl TaskNode {
    /// Create a node with a fresh instance id
    #[must_use]
    pub fn new(decl: Arc<NodeDecl>, path: TreePath, parent: Option<NodeHandle>) -> Self {
        let body = if decl.is_composite() {
            NodeBody::Composite(Box::default())
        } else {
            NodeBody::Leaf
        };
        Self {
            decl,
            path,
            instance: InstanceId::new(),
            parent,
            runtime: Arc::new(NodeRuntime::new()),
            body,
        }
    }

    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.decl.id
    }

    /// Whether this is a composite node
    #[inline]
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self.body, NodeBody::Composite(_))
    }

    /// Registry set of a composite
    #[inline]
    #[must_use]
    pub fn registries(&self) -> Option<&RegistrySet> {
        match &self.body {
            NodeBody::Composite(reg) => Some(&**reg),
            NodeBody::Leaf => None,
        }
    }

    /// Mutable registry set of a composite
    #[inline]
    pub fn registries_mut(&mut self) -> Option<&mut RegistrySet> {
        match &mut self.body {
            NodeBody::Composite(reg) => Some(&mut **reg),
            NodeBody::Leaf => None,
        }
    }

    /// Reference to this node at `handle`
    #[inline]
    #[must_use]
    pub fn node_ref(&self, handle: NodeHandle) -> NodeRef {
        NodeRef::new(handle, self.instance)
    }

    /// Detached view for collaborators
    #[must_use]
    pub fn view(&self, handle: NodeHandle) -> NodeView {
        NodeView {
            node: self.node_ref(handle),
            path: self.path.clone(),
            decl: Arc::clone(&self.decl),
            runtime: Arc::clone(&self.runtime),
        }
    }
}

/// What collaborators see of a node: identity, configuration and the
/// runtime cell, but no structure
#[derive(Debug, Clone)]
pub struct NodeView {
    /// Handle and instance
    pub node: NodeRef,
    /// Correlation path
    pub path: TreePath,
    /// Declaration
    pub decl: Arc<NodeDecl>,
    /// Runtime cell
    pub runtime: Arc<NodeRuntime>,
}

impl NodeView {
    /// Whether the view is of a leaf
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        !self.decl.is_composite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_ignores_writes_after_release() {
        let rt = NodeRuntime::new();
        assert!(rt.set(Logical::True));
        assert!(rt.release());
        assert!(!rt.release());
        assert!(!rt.set(Logical::False));
        assert_eq!(rt.logical(), Logical::True);
    }

    #[test]
    fn clear_keeps_last_known() {
        let rt = NodeRuntime::with_value(Logical::False);
        rt.clear();
        assert_eq!(rt.logical(), Logical::Unknown);
        assert_eq!(rt.last_known(), Logical::False);
    }

    #[test]
    fn invalidate_bumps_epoch() {
        let rt = NodeRuntime::new();
        assert_eq!(rt.invalidate(), 1);
        assert_eq!(rt.invalidate(), 2);
        assert!(rt.fire("Done"));
        assert_eq!(rt.state().last_event.as_deref(), Some("Done"));
    }
}
