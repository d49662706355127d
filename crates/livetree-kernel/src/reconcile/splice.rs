//! Splice engine: replace one active node by its candidate in place
//!
//! ```text
//! Detaching → Installing → Starting → ReconcilingChildren → Repairing → DisposingOld → Done
//! ```
//!
//! The arena write lock is taken per structural edit and never held across
//! a lifecycle or observer call.

use super::matcher::ChildMatch;
use super::phase::{PhaseTracker, SplicePhase};
use super::shell::dispose_subtree;
use super::Pass;
use crate::error::ReconcileError;
use crate::lifecycle::StartRequest;
use crate::path::TreePath;
use crate::registry::Superseded;
use crate::tree::arena::{ancestors, child_slots, propagate, slot_of, subtree, Arena};
use crate::types::{NodeHandle, NodeRef};
use std::collections::HashMap;

/// What the driver needs to know after a splice
#[derive(Debug, Default)]
pub(crate) struct SpliceOutcome {
    /// Active children moved under the installed node, in slot order
    pub(crate) relocated: Vec<NodeHandle>,
}

/// Run a full splice of `active` → `candidate`.
///
/// `matched` must come from correlating these two nodes.
pub(crate) fn splice(
    pass: &mut Pass<'_>,
    active: NodeHandle,
    candidate: NodeHandle,
    matched: &ChildMatch,
) -> Result<SpliceOutcome, ReconcileError> {
    let tree = pass.tree;
    let mut phase = PhaseTracker::new();

    // Everything that may be superseded, captured before structure moves
    let stale: Vec<(TreePath, NodeRef)> = {
        let arena = tree.read();
        let mut stale = refs_by_path(&arena, active);
        for donor in &matched.donors {
            stale.extend(refs_by_path(&arena, *donor));
        }
        stale
    };
    {
        let arena = tree.read();
        pass.retired.extend(refs_by_id(&arena, active));
    }

    // Detaching
    let (path, parent, slot) = {
        let mut arena = tree.write();
        let node = arena
            .node_weight(active)
            .ok_or(ReconcileError::MissingNode { handle: active })?;
        let path = node.path.clone();
        let parent = node
            .parent
            .ok_or_else(|| ReconcileError::MissingParentSlot { path: path.clone() })?;
        let (edge, slot) = slot_of(&arena, parent, active)
            .ok_or_else(|| ReconcileError::MissingParentSlot { path: path.clone() })?;
        arena.remove_edge(edge);
        arena[active].parent = None;
        (path, parent, slot)
    };
    pass.shell.adopt_orphan(active);
    tracing::info!(%path, slot, "splicing node");

    // Installing
    phase.advance(SplicePhase::Installing)?;
    {
        let mut arena = tree.write();
        let candidate_parent = arena
            .node_weight(candidate)
            .ok_or(ReconcileError::MissingNode { handle: candidate })?
            .parent;
        if let Some(candidate_parent) = candidate_parent {
            let (edge, _) = slot_of(&arena, candidate_parent, candidate)
                .ok_or_else(|| ReconcileError::MissingParentSlot { path: path.clone() })?;
            arena.remove_edge(edge);
        }
        arena.add_edge(parent, candidate, slot);
        arena[candidate].parent = Some(parent);
        arena[parent].runtime.clear();
    }

    // Starting
    phase.advance(SplicePhase::Starting)?;
    let request = {
        let arena = tree.read();
        StartRequest {
            root: arena[candidate].view(candidate),
            nodes: subtree(&arena, candidate)
                .into_iter()
                .map(|h| arena[h].view(h))
                .collect(),
        }
    };
    let ack = pass.lifecycle.start(&request)?;
    if !ack.wait(pass.config.start_timeout()) {
        return Err(ReconcileError::StartTimeout {
            path,
            timeout_ms: pass.config.start_timeout_ms,
        });
    }
    pass.report.reloaded_leaves.extend(
        request
            .leaves()
            .filter(|v| !v.decl.is_placeholder())
            .map(|v| v.path.clone()),
    );
    propagate(&tree.read(), candidate);

    // ReconcilingChildren
    phase.advance(SplicePhase::ReconcilingChildren)?;
    let mut outcome = SpliceOutcome::default();
    let old_children = child_slots(&tree.read(), active);
    let mut relocated_by_slot = Vec::new();
    for (active_slot, child) in old_children {
        let Some(candidate_slot) = matched.correspondence.get(active_slot) else {
            pass.report.disposed += dispose_subtree(tree, Some(pass.lifecycle), child);
            continue;
        };
        let placeholder = matched.placeholders.get(&candidate_slot).copied();
        let view = {
            let mut arena = tree.write();
            let (edge, _) = slot_of(&arena, active, child).ok_or_else(|| ReconcileError::MissingParentSlot {
                path: arena[child].path.clone(),
            })?;
            arena.remove_edge(edge);
            if let Some((edge, _)) = placeholder.and_then(|p| slot_of(&arena, candidate, p)) {
                arena.remove_edge(edge);
                if let Some(p) = placeholder {
                    arena[p].parent = None;
                }
            }
            arena.add_edge(candidate, child, candidate_slot);
            arena[child].parent = Some(candidate);
            arena[child].view(child)
        };
        if let Some(p) = placeholder {
            dispose_subtree(tree, Some(pass.lifecycle), p);
        }
        view.runtime.invalidate();
        for observer in pass.observers {
            observer.node_invalidated(&view);
        }
        tracing::debug!(path = %view.path, "child relocated");
        pass.report.relocated.push(view.path.clone());
        relocated_by_slot.push((candidate_slot, child));
    }
    relocated_by_slot.sort_by_key(|(slot, _)| *slot);
    outcome.relocated = relocated_by_slot.into_iter().map(|(_, h)| h).collect();
    if pass.config.revalidate_after_relocation {
        propagate(&tree.read(), candidate);
    }

    // Repairing
    phase.advance(SplicePhase::Repairing)?;
    pass.report.repaired_entries += repair(pass, candidate, &stale)?;

    // DisposingOld
    phase.advance(SplicePhase::DisposingOld)?;
    pass.report.disposed += dispose_subtree(tree, Some(pass.lifecycle), active);
    pass.shell.release_orphan(active);

    phase.advance(SplicePhase::Done)?;
    tracing::debug!(%path, phase = %phase.current(), relocated = outcome.relocated.len(), "splice complete");
    pass.report.spliced.push(path);
    Ok(outcome)
}

/// Back-reference repair for the subtree installed at `installed`.
///
/// Every stale instance whose path now holds a different live node is
/// superseded by it. Registries inside the installed subtree (relocated
/// children included) and in every ancestor are rewritten accordingly.
fn repair(pass: &Pass<'_>, installed: NodeHandle, stale: &[(TreePath, NodeRef)]) -> Result<usize, ReconcileError> {
    let mut arena = pass.tree.write();

    let live: HashMap<TreePath, NodeRef> = refs_by_path(&arena, installed).into_iter().collect();
    let mut superseded = Superseded::new();
    for (path, old) in stale {
        if let Some(new) = live.get(path) {
            superseded.insert(old.instance, *new);
        }
    }

    let mut rewritten = 0;
    for handle in subtree(&arena, installed) {
        if let Some(reg) = arena[handle].registries_mut() {
            rewritten += reg.repair(None, &superseded);
        }
    }

    for ancestor in ancestors(&arena, installed) {
        let counterpart = pass
            .candidate_index
            .get(&arena[ancestor].path)
            .and_then(|c| arena.node_weight(c))
            .and_then(|c| c.registries().cloned());
        let path = arena[ancestor].path.clone();
        let reg = arena[ancestor]
            .registries_mut()
            .ok_or(ReconcileError::MissingRegistry { path })?;
        rewritten += reg.repair(counterpart.as_ref(), &superseded);
    }

    tracing::debug!(superseded = superseded.len(), rewritten, "back references repaired");
    Ok(rewritten)
}

/// Final repair over the whole active tree, keyed by node id.
///
/// Every retired instance (replaced active nodes, and candidate nodes whose
/// registrations were copied into the active tree) is superseded by the
/// live node carrying the same id. Covers what path-based repair cannot
/// see: nodes that moved to another parent, and registrations added to
/// nodes that were never spliced.
pub(crate) fn rebind_by_id(pass: &mut Pass<'_>) -> usize {
    let mut arena = pass.tree.write();
    let live: HashMap<String, NodeRef> = refs_by_id(&arena, pass.tree.root()).into_iter().collect();

    let mut superseded = Superseded::new();
    for (id, old) in pass.retired.drain(..) {
        if let Some(new) = live.get(&id) {
            superseded.insert(old.instance, *new);
        }
    }

    let mut rewritten = 0;
    for node in live.values() {
        if let Some(reg) = arena[node.handle].registries_mut() {
            rewritten += reg.repair(None, &superseded);
        }
    }
    if rewritten > 0 {
        tracing::debug!(superseded = superseded.len(), rewritten, "registries rebound by id");
    }
    rewritten
}

pub(crate) fn refs_by_id(arena: &Arena, root: NodeHandle) -> Vec<(String, NodeRef)> {
    subtree(arena, root)
        .into_iter()
        .map(|h| (arena[h].id().to_string(), arena[h].node_ref(h)))
        .collect()
}

fn refs_by_path(arena: &Arena, root: NodeHandle) -> Vec<(TreePath, NodeRef)> {
    subtree(arena, root)
        .into_iter()
        .map(|h| (arena[h].path.clone(), arena[h].node_ref(h)))
        .collect()
}
