//! Rewriting registry entries that point at replaced nodes

use super::{CheckerShell, RegistrySet, TriggerShell, WorkerShell};
use crate::types::{InstanceId, NodeRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Stale instance → live node that took its place
#[derive(Debug, Clone, Default)]
pub struct Superseded {
    map: HashMap<InstanceId, NodeRef>,
}

impl Superseded {
    /// Empty mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `stale` is now represented by `live`
    pub fn insert(&mut self, stale: InstanceId, live: NodeRef) {
        if stale != live.instance {
            self.map.insert(stale, live);
        }
    }

    /// Whether `node` points at a replaced instance
    #[inline]
    #[must_use]
    pub fn contains(&self, node: &NodeRef) -> bool {
        self.map.contains_key(&node.instance)
    }

    /// Live replacement for `node`, or `node` itself
    #[inline]
    #[must_use]
    pub fn resolve(&self, node: NodeRef) -> NodeRef {
        self.map.get(&node.instance).copied().unwrap_or(node)
    }

    /// Number of recorded replacements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing was replaced
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl RegistrySet {
    /// Rewrite every entry whose node was superseded.
    ///
    /// Node references are redirected to the replacement. Shells are taken
    /// from `counterpart` (the candidate registry at the same path) when it
    /// has the same key, otherwise the existing shell is re-owned. Returns
    /// the number of rewritten entries.
    pub fn repair(&mut self, counterpart: Option<&RegistrySet>, superseded: &Superseded) -> usize {
        if superseded.is_empty() {
            return 0;
        }
        let mut rewritten = 0;

        for map in [
            &mut self.jobs_by_name,
            &mut self.last_chance_by_name,
            &mut self.nodes_by_id,
            &mut self.nodes_by_name,
        ] {
            rewritten += repair_refs(map, superseded);
        }

        for (event, sources) in &mut self.event_triggers {
            for (source, shell) in sources.iter_mut() {
                if !superseded.contains(&shell.owner) {
                    continue;
                }
                let fresh = counterpart
                    .and_then(|c| c.event_triggers.get(event))
                    .and_then(|m| m.get(source))
                    .unwrap_or(shell);
                *shell = reowned_trigger(fresh, superseded);
                rewritten += 1;
            }
        }

        for (key, sources) in &mut self.workers {
            for (source, workers) in sources.iter_mut() {
                for worker in workers.iter_mut() {
                    if !superseded.contains(&worker.owner) {
                        continue;
                    }
                    let fresh = counterpart
                        .and_then(|c| c.workers.get(key))
                        .and_then(|m| m.get(source))
                        .and_then(|ws| ws.iter().find(|w| w.slave_path == worker.slave_path))
                        .unwrap_or(worker);
                    *worker = reowned_worker(fresh, superseded);
                    rewritten += 1;
                }
            }
        }

        rewritten += repair_checkers(
            &mut self.connector_checkers,
            counterpart.map(|c| &c.connector_checkers),
            superseded,
        );
        rewritten += repair_checkers(
            &mut self.external_checkers,
            counterpart.map(|c| &c.external_checkers),
            superseded,
        );

        rewritten
    }
}

fn repair_refs(map: &mut BTreeMap<String, NodeRef>, superseded: &Superseded) -> usize {
    let mut rewritten = 0;
    for node in map.values_mut() {
        if superseded.contains(node) {
            *node = superseded.resolve(*node);
            rewritten += 1;
        }
    }
    rewritten
}

fn repair_checkers(
    map: &mut BTreeMap<String, Arc<CheckerShell>>,
    counterpart: Option<&BTreeMap<String, Arc<CheckerShell>>>,
    superseded: &Superseded,
) -> usize {
    let mut rewritten = 0;
    for (key, shell) in map.iter_mut() {
        if !superseded.contains(&shell.owner) {
            continue;
        }
        let fresh = counterpart.and_then(|c| c.get(key)).unwrap_or(shell);
        *shell = if superseded.contains(&fresh.owner) {
            Arc::new(CheckerShell {
                owner: superseded.resolve(fresh.owner),
                ..(**fresh).clone()
            })
        } else {
            Arc::clone(fresh)
        };
        rewritten += 1;
    }
    rewritten
}

fn reowned_trigger(shell: &Arc<TriggerShell>, superseded: &Superseded) -> Arc<TriggerShell> {
    if superseded.contains(&shell.owner) {
        Arc::new(TriggerShell {
            owner: superseded.resolve(shell.owner),
            ..(**shell).clone()
        })
    } else {
        Arc::clone(shell)
    }
}

fn reowned_worker(shell: &Arc<WorkerShell>, superseded: &Superseded) -> Arc<WorkerShell> {
    if superseded.contains(&shell.owner) {
        Arc::new(WorkerShell {
            owner: superseded.resolve(shell.owner),
            ..(**shell).clone()
        })
    } else {
        Arc::clone(shell)
    }
}
