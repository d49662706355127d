//! Tokio-based run mechanism for leaves
//!
//! Each started leaf gets one task. The task evaluates the leaf's check,
//! commits the result into the tree and, when the leaf declares a trigger
//! interval, repeats until the leaf is disposed. Composite results follow
//! through commit propagation.
//!
//! A start is acknowledged once every started leaf has committed its first
//! result (or found itself released).

pub mod checks;

use crate::decl::DeclKind;
use crate::error::LifecycleError;
use crate::lifecycle::{NodeLifecycle, StartAck, StartRequest, StartSignal};
use crate::tree::arena::subtree;
use crate::tree::node::NodeView;
use crate::tree::{Commit, TaskTree};
use crate::types::{InstanceId, Logical};
use checks::{Check, CheckFactory, CheckRegistry};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs leaves as tokio tasks
pub struct TokioRunner {
    handle: Handle,
    tree: Weak<TaskTree>,
    checks: Arc<dyn CheckFactory>,
    tasks: DashMap<InstanceId, JoinHandle<()>>,
}

impl std::fmt::Debug for TokioRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioRunner")
            .field("running", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl TokioRunner {
    /// Runner committing into `tree`, spawning on `handle`, with the
    /// built-in check kinds
    #[must_use]
    pub fn new(handle: Handle, tree: &Arc<TaskTree>) -> Self {
        Self {
            handle,
            tree: Arc::downgrade(tree),
            checks: Arc::new(CheckRegistry::builtin()),
            tasks: DashMap::new(),
        }
    }

    /// Use another check factory
    #[must_use]
    pub fn with_checks(mut self, checks: Arc<dyn CheckFactory>) -> Self {
        self.checks = checks;
        self
    }

    /// Number of leaf tasks currently tracked
    #[must_use]
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Start every leaf of the active tree
    ///
    /// # Errors
    /// Returns error if the tree is gone or a check cannot be created
    pub fn start_all(&self) -> Result<StartAck, LifecycleError> {
        let tree = self.tree.upgrade().ok_or(LifecycleError::TreeDropped)?;
        let request = {
            let arena = tree.read();
            let root = tree.root();
            StartRequest {
                root: arena[root].view(root),
                nodes: subtree(&arena, root)
                    .into_iter()
                    .map(|h| arena[h].view(h))
                    .collect(),
            }
        };
        self.start(&request)
    }

    /// Abort every tracked task
    pub fn shutdown(&self) {
        let instances: Vec<InstanceId> = self.tasks.iter().map(|e| *e.key()).collect();
        for instance in instances {
            if let Some((_, task)) = self.tasks.remove(&instance) {
                task.abort();
            }
        }
    }

    fn check_for(&self, view: &NodeView) -> Result<Arc<dyn Check>, LifecycleError> {
        match &view.decl.kind {
            DeclKind::Leaf { check } => self.checks.for_leaf(check),
            DeclKind::Composite { .. } => Err(LifecycleError::StartFailed {
                path: view.path.clone(),
                reason: "composite nodes have no check".into(),
            }),
        }
    }
}

impl NodeLifecycle for TokioRunner {
    fn start(&self, request: &StartRequest) -> Result<StartAck, LifecycleError> {
        if self.tree.strong_count() == 0 {
            return Err(LifecycleError::TreeDropped);
        }

        // resolve every check before spawning anything
        let jobs = request
            .leaves()
            .map(|view| Ok((view.clone(), self.check_for(view)?)))
            .collect::<Result<Vec<_>, LifecycleError>>()?;

        let (signal, ack) = StartAck::pending();
        if jobs.is_empty() {
            signal.notify();
            return Ok(ack);
        }

        let pending = Arc::new(AtomicUsize::new(jobs.len()));
        tracing::debug!(root = %request.root.path, leaves = jobs.len(), "starting leaves");
        for (view, check) in jobs {
            let instance = view.node.instance;
            let leaf = LeafTask {
                tree: Weak::clone(&self.tree),
                view,
                check,
                pending: Arc::clone(&pending),
                signal: signal.clone(),
            };
            let task = self.handle.spawn(leaf.run());
            if let Some(previous) = self.tasks.insert(instance, task) {
                previous.abort();
            }
        }
        Ok(ack)
    }

    fn dispose(&self, node: &NodeView) {
        if let Some((_, task)) = self.tasks.remove(&node.node.instance) {
            task.abort();
            tracing::trace!(path = %node.path, "leaf task aborted");
        }
    }
}

impl Drop for TokioRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct LeafTask {
    tree: Weak<TaskTree>,
    view: NodeView,
    check: Arc<dyn Check>,
    pending: Arc<AtomicUsize>,
    signal: StartSignal,
}

impl LeafTask {
    async fn run(self) {
        let interval = self
            .view
            .decl
            .settings
            .trigger
            .as_ref()
            .and_then(|t| t.interval_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        let mut acknowledged = false;

        loop {
            if self.view.runtime.is_released() {
                break;
            }
            let value = match self.check.evaluate().await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(path = %self.view.path, error = %err, "check failed");
                    Logical::Unknown
                }
            };
            let Some(tree) = self.tree.upgrade() else {
                break;
            };
            if tree.commit(self.view.node, value) == Commit::Applied && value.is_known() {
                tree.fire(self.view.node, &value.to_string());
            }
            drop(tree);

            if !acknowledged {
                acknowledged = true;
                self.acknowledge();
            }
            let Some(period) = interval else {
                break;
            };
            tokio::time::sleep(period).await;
        }

        if !acknowledged {
            self.acknowledge();
        }
    }

    fn acknowledge(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.signal.notify();
        }
    }
}
