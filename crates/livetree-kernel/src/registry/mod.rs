//! Per-composite registries
//!
//! Every composite node owns a [`RegistrySet`]. Part of it is propagated:
//! entries are merged into every ancestor composite up to the root, so the
//! root sees the whole tree. The rest is local to the composite that
//! declared it.
//!
//! Values are shared handles (`Arc` shells and [`NodeRef`]s). Copying an
//! entry between registry sets copies the handle, never the underlying
//! object.

mod reconcile;
mod repair;

pub use reconcile::{reconcile_registries, RegistryDelta};
pub use repair::Superseded;

use crate::decl::{CheckSpec, TriggerDecl};
use crate::types::NodeRef;
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Event every composite's worker cache carries
pub const BREAKED_EVENT: &str = "Breaked";

/// Trigger wiring registered by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerShell {
    /// Event name
    pub event: String,
    /// Id of the node the trigger belongs to
    pub source: String,
    /// Owning node
    pub owner: NodeRef,
    /// Declared trigger
    pub decl: TriggerDecl,
}

/// External worker attached to a node event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerShell {
    /// Identity of the worker: path of the node it drives
    pub slave_path: String,
    /// Node declaring the worker
    pub owner: NodeRef,
}

/// Checker registered on a composite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerShell {
    /// Name or id the checker is registered under
    pub key: String,
    /// Composite declaring the checker
    pub owner: NodeRef,
    /// Check to evaluate
    pub check: CheckSpec,
}

/// Leaf evaluated outside the tree but owned by a composite.
///
/// Compared by content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLeaf {
    /// Leaf id
    pub id: String,
    /// Check to evaluate
    pub check: CheckSpec,
}

/// event → source id → trigger
pub type TriggerMap = BTreeMap<String, BTreeMap<String, Arc<TriggerShell>>>;

/// `"<node-id>:<event>"` → source id → workers
pub type WorkerMap = BTreeMap<String, BTreeMap<String, Vec<Arc<WorkerShell>>>>;

/// Key of the worker map
#[must_use]
pub fn worker_key(node_id: &str, event: &str) -> String {
    format!("{node_id}:{event}")
}

/// Registries owned by one composite node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySet {
    // Propagated to the root
    /// Event triggers of every descendant
    pub event_triggers: TriggerMap,
    /// Composite descendants by name
    pub jobs_by_name: BTreeMap<String, NodeRef>,
    /// "Last chance" handlers by name
    pub last_chance_by_name: BTreeMap<String, NodeRef>,
    /// Every descendant by id
    pub nodes_by_id: BTreeMap<String, NodeRef>,
    /// Events any trigger below reacts to
    pub trigger_events: IndexSet<String>,
    /// Events any logger below records
    pub logger_events: IndexSet<String>,

    // Local to this composite
    /// Workers declared by direct children (or the composite itself)
    pub workers: WorkerMap,
    /// Checkers waiting for a connector to resolve
    pub connector_checkers: BTreeMap<String, Arc<CheckerShell>>,
    /// Checkers evaluated outside the tree
    pub external_checkers: BTreeMap<String, Arc<CheckerShell>>,
    /// Leaves evaluated outside the tree
    pub external_leaves: Vec<Arc<ExternalLeaf>>,
    /// Direct children by name
    pub nodes_by_name: BTreeMap<String, NodeRef>,
    /// Events any worker here reacts to
    pub worker_events: IndexSet<String>,
}

impl Default for RegistrySet {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrySet {
    /// Empty registry set; the worker cache starts with [`BREAKED_EVENT`]
    #[must_use]
    pub fn new() -> Self {
        let mut worker_events = IndexSet::new();
        worker_events.insert(BREAKED_EVENT.to_string());
        Self {
            event_triggers: BTreeMap::new(),
            jobs_by_name: BTreeMap::new(),
            last_chance_by_name: BTreeMap::new(),
            nodes_by_id: BTreeMap::new(),
            trigger_events: IndexSet::new(),
            logger_events: IndexSet::new(),
            workers: BTreeMap::new(),
            connector_checkers: BTreeMap::new(),
            external_checkers: BTreeMap::new(),
            external_leaves: Vec::new(),
            nodes_by_name: BTreeMap::new(),
            worker_events,
        }
    }

    /// Register a trigger shell under its event and source
    pub fn insert_trigger(&mut self, shell: Arc<TriggerShell>) {
        self.trigger_events.insert(shell.event.clone());
        self.event_triggers
            .entry(shell.event.clone())
            .or_default()
            .insert(shell.source.clone(), shell);
    }

    /// Register a worker; duplicates by slave path are ignored
    pub fn insert_worker(&mut self, node_id: &str, event: &str, source: &str, shell: Arc<WorkerShell>) {
        self.worker_events.insert(event.to_string());
        let workers = self
            .workers
            .entry(worker_key(node_id, event))
            .or_default()
            .entry(source.to_string())
            .or_default();
        if !workers.iter().any(|w| w.slave_path == shell.slave_path) {
            workers.push(shell);
        }
    }

    /// Register a tree-external leaf unless an equal one is present
    pub fn insert_external_leaf(&mut self, leaf: Arc<ExternalLeaf>) {
        if !self.external_leaves.iter().any(|l| **l == *leaf) {
            self.external_leaves.push(leaf);
        }
    }

    /// Every node reference held anywhere in the set, for diagnostics
    #[must_use]
    pub fn node_refs(&self) -> Vec<NodeRef> {
        let mut refs: Vec<NodeRef> = self
            .event_triggers
            .values()
            .flat_map(|m| m.values().map(|s| s.owner))
            .collect();
        refs.extend(self.jobs_by_name.values().copied());
        refs.extend(self.last_chance_by_name.values().copied());
        refs.extend(self.nodes_by_id.values().copied());
        refs.extend(
            self.workers
                .values()
                .flat_map(|m| m.values().flatten().map(|w| w.owner)),
        );
        refs.extend(self.connector_checkers.values().map(|c| c.owner));
        refs.extend(self.external_checkers.values().map(|c| c.owner));
        refs.extend(self.nodes_by_name.values().copied());
        refs
    }

    /// Trigger keys as `(event, source)` pairs
    #[must_use]
    pub fn trigger_keys(&self) -> Vec<(String, String)> {
        self.event_triggers
            .iter()
            .flat_map(|(e, m)| m.keys().map(move |s| (e.clone(), s.clone())))
            .collect()
    }
}
