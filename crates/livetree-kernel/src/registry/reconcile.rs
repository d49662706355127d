//! Two-way, set-based registry synchronization
//!
//! Brings an active registry set in line with its candidate counterpart:
//! keys only the candidate has are added (sharing the candidate's handle),
//! keys only the active side has are removed, and common keys keep the
//! active value. Running it twice is a no-op the second time.

use super::{RegistrySet, WorkerShell};
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

/// Number of entries touched by a registry reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryDelta {
    /// Entries copied from the candidate
    pub added: usize,
    /// Entries dropped from the active side
    pub removed: usize,
}

impl RegistryDelta {
    /// True when nothing changed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }

    fn merge(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
    }
}

/// Synchronize `active` with `candidate`.
pub fn reconcile_registries(active: &mut RegistrySet, candidate: &RegistrySet) -> RegistryDelta {
    let mut delta = RegistryDelta::default();

    // Propagated
    delta.merge(sync_nested(&mut active.event_triggers, &candidate.event_triggers));
    delta.merge(sync_keys(&mut active.jobs_by_name, &candidate.jobs_by_name));
    delta.merge(sync_keys(
        &mut active.last_chance_by_name,
        &candidate.last_chance_by_name,
    ));
    delta.merge(sync_keys(&mut active.nodes_by_id, &candidate.nodes_by_id));
    delta.merge(sync_cache(&mut active.trigger_events, &candidate.trigger_events));
    delta.merge(sync_cache(&mut active.logger_events, &candidate.logger_events));

    // Local
    delta.merge(sync_workers(active, candidate));
    delta.merge(sync_keys(
        &mut active.connector_checkers,
        &candidate.connector_checkers,
    ));
    delta.merge(sync_keys(
        &mut active.external_checkers,
        &candidate.external_checkers,
    ));
    delta.merge(sync_external_leaves(active, candidate));
    delta.merge(sync_keys(&mut active.nodes_by_name, &candidate.nodes_by_name));
    delta.merge(sync_cache(&mut active.worker_events, &candidate.worker_events));

    delta
}

fn sync_keys<K, V>(active: &mut BTreeMap<K, V>, candidate: &BTreeMap<K, V>) -> RegistryDelta
where
    K: Ord + Clone,
    V: Clone,
{
    let mut delta = RegistryDelta::default();
    for (key, value) in candidate {
        if !active.contains_key(key) {
            active.insert(key.clone(), value.clone());
            delta.added += 1;
        }
    }
    let before = active.len();
    active.retain(|key, _| candidate.contains_key(key));
    delta.removed += before - active.len();
    delta
}

fn sync_nested<K1, K2, V>(
    active: &mut BTreeMap<K1, BTreeMap<K2, V>>,
    candidate: &BTreeMap<K1, BTreeMap<K2, V>>,
) -> RegistryDelta
where
    K1: Ord + Clone,
    K2: Ord + Clone,
    V: Clone,
{
    let mut delta = sync_keys(active, candidate);
    for (key, inner) in active.iter_mut() {
        if let Some(candidate_inner) = candidate.get(key) {
            delta.merge(sync_keys(inner, candidate_inner));
        }
    }
    delta
}

fn sync_cache<T>(active: &mut IndexSet<T>, candidate: &IndexSet<T>) -> RegistryDelta
where
    T: Hash + Eq + Clone,
{
    let mut delta = RegistryDelta::default();
    for item in candidate {
        if active.insert(item.clone()) {
            delta.added += 1;
        }
    }
    let before = active.len();
    active.retain(|item| candidate.contains(item));
    delta.removed += before - active.len();
    delta
}

fn sync_workers(active: &mut RegistrySet, candidate: &RegistrySet) -> RegistryDelta {
    let mut delta = sync_nested(&mut active.workers, &candidate.workers);
    for (key, sources) in &mut active.workers {
        let Some(candidate_sources) = candidate.workers.get(key) else {
            continue;
        };
        for (source, workers) in sources.iter_mut() {
            if let Some(candidate_workers) = candidate_sources.get(source) {
                delta.merge(sync_worker_array(workers, candidate_workers));
            }
        }
    }
    delta
}

/// Union on add, intersection on remove, both by slave path.
fn sync_worker_array(active: &mut Vec<Arc<WorkerShell>>, candidate: &[Arc<WorkerShell>]) -> RegistryDelta {
    let mut delta = RegistryDelta::default();
    for worker in candidate {
        if !active.iter().any(|w| w.slave_path == worker.slave_path) {
            active.push(Arc::clone(worker));
            delta.added += 1;
        }
    }
    let before = active.len();
    active.retain(|w| candidate.iter().any(|c| c.slave_path == w.slave_path));
    delta.removed += before - active.len();
    delta
}

fn sync_external_leaves(active: &mut RegistrySet, candidate: &RegistrySet) -> RegistryDelta {
    let mut delta = RegistryDelta::default();
    for leaf in &candidate.external_leaves {
        if !active.external_leaves.iter().any(|l| **l == **leaf) {
            active.external_leaves.push(Arc::clone(leaf));
            delta.added += 1;
        }
    }
    let before = active.external_leaves.len();
    active
        .external_leaves
        .retain(|l| candidate.external_leaves.iter().any(|c| **c == **l));
    delta.removed += before - active.external_leaves.len();
    delta
}
