//! Hot reconciliation of a running tree against a freshly built candidate
//!
//! # Pass
//!
//! 1. Take the structural-mutation guard.
//! 2. Index the active and candidate trees by path.
//! 3. Walk the active tree depth-first, pre-order. At each node:
//!    - look up the candidate at the same path (absence is fatal)
//!    - reconcile registries when both are composites
//!    - equal: descend; unequal: correlate children and splice, then
//!      continue into the relocated children only
//! 4. Rebind registry entries still pointing at replaced or candidate
//!    nodes to the live node with the same id.
//! 5. Discard what is left of the candidate, notify observers, release the
//!    guard.
//!
//! The root is never spliced. A differing root is reported and the pass
//! stops there.
//!
//! # Example
//!
//! ```rust,ignore
//! let tree = TaskTree::from_spec(&active_spec)?;
//! let reconciler = Reconciler::new(ReconcileConfig::default(), Arc::new(runner));
//! let candidate = tree.stage(&edited_spec)?;
//! let report = reconciler.reconcile(&tree, candidate)?;
//! ```

pub mod matcher;
pub mod phase;
mod shell;
mod splice;

use crate::config::ReconcileConfig;
use crate::equality::nodes_equal;
use crate::error::ReconcileError;
use crate::index::GraphIndex;
use crate::lifecycle::{NodeLifecycle, ReconcileObserver};
use crate::path::TreePath;
use crate::registry::{reconcile_registries, RegistryDelta};
use crate::tree::arena::{children, Arena};
use crate::tree::TaskTree;
use crate::types::{NodeHandle, NodeRef};
use serde::Serialize;
use shell::CandidateShell;
use std::sync::Arc;
use std::time::Instant;

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Paths of replaced nodes, in walk order
    pub spliced: Vec<TreePath>,
    /// Paths of live children moved under a replacement
    pub relocated: Vec<TreePath>,
    /// Active nodes disposed
    pub disposed: usize,
    /// Candidate nodes discarded without ever running
    pub discarded: usize,
    /// Leaves installed by this pass; loaders may bypass caches for them
    pub reloaded_leaves: Vec<TreePath>,
    /// Registry entries added or removed by reconciliation
    pub registry_changes: usize,
    /// Registry entries rewritten by back-reference repair
    pub repaired_entries: usize,
    /// The root differed and was kept as is
    pub root_mismatch: bool,
    /// Active nodes before the pass
    pub nodes_before: usize,
    /// Active nodes after the pass
    pub nodes_after: usize,
}

impl ReconcileReport {
    /// Whether the pass left the tree structure untouched
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.spliced.is_empty() && !self.root_mismatch
    }
}

/// State shared by the driver and the splice engine during one pass
pub(crate) struct Pass<'a> {
    pub(crate) tree: &'a TaskTree,
    pub(crate) lifecycle: &'a dyn NodeLifecycle,
    pub(crate) observers: &'a [Arc<dyn ReconcileObserver>],
    pub(crate) config: &'a ReconcileConfig,
    pub(crate) candidate_index: GraphIndex,
    pub(crate) shell: CandidateShell<'a>,
    pub(crate) report: ReconcileReport,
    /// Instances that may still be referenced by registries, with their ids
    pub(crate) retired: Vec<(String, NodeRef)>,
}

/// Reconciliation driver
pub struct Reconciler {
    config: ReconcileConfig,
    lifecycle: Arc<dyn NodeLifecycle>,
    observers: Vec<Arc<dyn ReconcileObserver>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler starting and disposing nodes through `lifecycle`
    #[must_use]
    pub fn new(config: ReconcileConfig, lifecycle: Arc<dyn NodeLifecycle>) -> Self {
        Self {
            config,
            lifecycle,
            observers: Vec::new(),
        }
    }

    /// Register an observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile the active tree of `tree` against the staged `candidate`.
    ///
    /// The candidate is consumed: whatever was not donated is discarded,
    /// on failure too. The structural guard is held for the whole pass.
    ///
    /// # Errors
    /// Returns error on a broken correlation or parent link, on a failing
    /// or unacknowledged start, or on a composite without registries. The
    /// active tree stays structurally consistent but may be partially
    /// updated.
    pub fn reconcile(&self, tree: &TaskTree, candidate: NodeHandle) -> Result<ReconcileReport, ReconcileError> {
        let started = Instant::now();
        let _guard = tree.lock_structure();

        let shell = CandidateShell::new(tree, self.lifecycle.as_ref(), candidate);
        let (active_index, candidate_index, retired) = {
            let arena = tree.read();
            if arena.node_weight(candidate).is_none() {
                return Err(ReconcileError::MissingNode { handle: candidate });
            }
            (
                GraphIndex::build(&arena, tree.root()),
                GraphIndex::build(&arena, candidate),
                splice::refs_by_id(&arena, candidate),
            )
        };
        tracing::info!(
            active = active_index.len(),
            candidate = candidate_index.len(),
            "reconciliation started"
        );

        let mut pass = Pass {
            tree,
            lifecycle: self.lifecycle.as_ref(),
            observers: &self.observers,
            config: &self.config,
            candidate_index,
            shell,
            report: ReconcileReport {
                nodes_before: active_index.len(),
                ..ReconcileReport::default()
            },
            retired,
        };

        let walked = walk(&mut pass);
        pass.report.repaired_entries += splice::rebind_by_id(&mut pass);
        walked?;

        let (disposed, discarded) = pass.shell.finish();
        let mut report = pass.report;
        report.disposed += disposed;
        report.discarded = discarded;
        report.nodes_after = tree.len();

        for observer in &self.observers {
            observer.reconciled(&report);
        }
        tracing::info!(
            spliced = report.spliced.len(),
            relocated = report.relocated.len(),
            disposed = report.disposed,
            root_mismatch = report.root_mismatch,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "reconciliation finished"
        );
        Ok(report)
    }
}

fn walk(pass: &mut Pass<'_>) -> Result<(), ReconcileError> {
    let tree = pass.tree;
    let root = tree.root();
    let mut stack = vec![root];

    while let Some(active) = stack.pop() {
        let path = tree
            .read()
            .node_weight(active)
            .map(|n| n.path.clone())
            .ok_or(ReconcileError::MissingNode { handle: active })?;
        let counterpart = pass
            .candidate_index
            .get(&path)
            .ok_or_else(|| ReconcileError::MissingCorrelation { path: path.clone() })?;

        let is_root = active == root;
        let equal = {
            let mut arena = tree.write();
            let saved = if is_root {
                arena[active].registries().cloned()
            } else {
                None
            };
            let delta = reconcile_pair(&mut arena, active, counterpart, &path)?;
            let equal = nodes_equal(&arena[active], &arena[counterpart]);
            if !equal && is_root {
                // the pass stops here; keep the root from pointing into a
                // candidate that is about to be discarded
                if let (Some(saved), Some(reg)) = (saved, arena[active].registries_mut()) {
                    *reg = saved;
                }
            } else {
                pass.report.registry_changes += delta.added + delta.removed;
            }
            equal
        };

        if equal {
            let kids = children(&tree.read(), active);
            stack.extend(kids.into_iter().rev());
            continue;
        }

        if is_root {
            tracing::warn!(%path, "root differs from candidate; a restart is required to replace it");
            pass.report.root_mismatch = true;
            continue;
        }

        let matched = matcher::correlate_children(&mut tree.write(), active, counterpart);
        pass.shell.add_donors(matched.donors.iter().copied());
        let outcome = splice::splice(pass, active, counterpart, &matched)?;
        stack.extend(outcome.relocated.into_iter().rev());
    }
    Ok(())
}

fn reconcile_pair(
    arena: &mut Arena,
    active: NodeHandle,
    candidate: NodeHandle,
    path: &TreePath,
) -> Result<RegistryDelta, ReconcileError> {
    if !(arena[active].is_composite() && arena[candidate].is_composite()) {
        return Ok(RegistryDelta::default());
    }
    let candidate_reg = arena[candidate]
        .registries()
        .cloned()
        .ok_or_else(|| ReconcileError::MissingRegistry { path: path.clone() })?;
    let active_reg = arena[active]
        .registries_mut()
        .ok_or_else(|| ReconcileError::MissingRegistry { path: path.clone() })?;
    let delta = reconcile_registries(active_reg, &candidate_reg);
    if !delta.is_empty() {
        tracing::debug!(%path, added = delta.added, removed = delta.removed, "registries reconciled");
    }
    Ok(delta)
}
