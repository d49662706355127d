//! Testing utilities for the livetree workspace
//!
//! Shared fixtures, a recording lifecycle and assertions.

#![allow(missing_docs)]

use livetree_kernel::decl::CheckSpec;
use livetree_kernel::lifecycle::{NodeLifecycle, ReconcileObserver, StartAck, StartRequest, StartSignal};
use livetree_kernel::registry::RegistrySet;
use livetree_kernel::tree::node::NodeView;
use livetree_kernel::{InstanceId, LifecycleError, Logical, NodeSpec, ReconcileReport, TaskTree, TreePath, TreeSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub fn constant(id: &str, value: bool) -> NodeSpec {
    NodeSpec::leaf(id, CheckSpec::new("constant", serde_json::json!({ "value": value })))
}

pub fn toggle(id: &str) -> NodeSpec {
    NodeSpec::leaf(id, CheckSpec::new("toggle", serde_json::Value::Null))
}

/// `root{a{x,y,z}}`, every leaf constant true
pub fn abc_spec() -> TreeSpec {
    TreeSpec::new(
        NodeSpec::composite(
            "root",
            vec![NodeSpec::composite("a", vec![constant("x", true), constant("y", true), constant("z", true)])
                .with_trigger(["E1"])],
        )
        .with_name("Root"),
    )
}

/// [`abc_spec`] with `y` replaced by a differently configured `y2`
pub fn abc_spec_with_y2() -> TreeSpec {
    let mut spec = abc_spec();
    if let Some(a) = spec.root.child_mut("a") {
        a.children[1] = constant("y2", false);
        a.expression = None;
    }
    spec
}

/// Deeper tree with workers, triggers and a relocatable composite:
/// `root{a{x, b{p,q}, y}, c{r}}`
pub fn nested_spec() -> TreeSpec {
    TreeSpec::new(NodeSpec::composite(
        "root",
        vec![
            NodeSpec::composite(
                "a",
                vec![
                    constant("x", true),
                    NodeSpec::composite("b", vec![constant("p", true), constant("q", true)])
                        .with_trigger(["Tick"])
                        .with_worker("Failed", "ops/notify"),
                    constant("y", true),
                ],
            )
            .with_logger(["Done"]),
            NodeSpec::composite("c", vec![constant("r", true)]).with_last_chance(),
        ],
    ))
}

pub fn path(s: &str) -> TreePath {
    s.parse().unwrap_or_else(|e| panic!("bad path {s}: {e}"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Commit every leaf's constant and acknowledge
    #[default]
    Commit,
    /// Refuse to start
    Fail,
    /// Accept the start, never acknowledge
    Silent,
}

/// Start/dispose counts of one node instance
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub starts: usize,
    pub disposes: usize,
}

/// Lifecycle counting calls per node instance.
///
/// In [`StartMode::Commit`] every started leaf with a constant check (or a
/// placeholder) commits its value synchronously before the ack is returned.
#[derive(Debug, Default)]
pub struct RecordingLifecycle {
    tree: Mutex<Weak<TaskTree>>,
    mode: Mutex<StartMode>,
    calls: Mutex<HashMap<InstanceId, Calls>>,
    paths: Mutex<HashMap<InstanceId, TreePath>>,
    held: Mutex<Vec<StartSignal>>,
}

impl RecordingLifecycle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commit into `tree` on start
    pub fn attach(&self, tree: &Arc<TaskTree>) {
        *self.tree.lock() = Arc::downgrade(tree);
    }

    pub fn set_mode(&self, mode: StartMode) {
        *self.mode.lock() = mode;
    }

    pub fn calls(&self, instance: InstanceId) -> Calls {
        self.calls.lock().get(&instance).copied().unwrap_or_default()
    }

    pub fn total_starts(&self) -> usize {
        self.calls.lock().values().map(|c| c.starts).sum()
    }

    pub fn total_disposes(&self) -> usize {
        self.calls.lock().values().map(|c| c.disposes).sum()
    }

    /// Instances disposed more than once
    pub fn double_disposed(&self) -> Vec<InstanceId> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| c.disposes > 1)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Paths of disposed instances, sorted
    pub fn disposed_paths(&self) -> Vec<String> {
        let calls = self.calls.lock();
        let paths = self.paths.lock();
        let mut out: Vec<String> = calls
            .iter()
            .filter(|(_, c)| c.disposes > 0)
            .filter_map(|(id, _)| paths.get(id).map(ToString::to_string))
            .collect();
        out.sort();
        out
    }

    /// Start every node of the active tree the way the reconciler would
    pub fn start_tree(&self, tree: &Arc<TaskTree>) {
        self.attach(tree);
        let root = tree.view(tree.root()).unwrap_or_else(|| panic!("root missing"));
        let mut nodes = Vec::new();
        tree.traverse(tree.root(), (), |handle, node, ()| {
            nodes.push(node.view(handle));
            livetree_kernel::tree::arena::Visit::Descend(())
        });
        let ack = self
            .start(&StartRequest { root, nodes })
            .unwrap_or_else(|e| panic!("start failed: {e}"));
        assert!(ack.wait(std::time::Duration::from_secs(1)));
    }

    fn record(&self, view: &NodeView, f: impl FnOnce(&mut Calls)) {
        self.paths.lock().insert(view.node.instance, view.path.clone());
        f(self.calls.lock().entry(view.node.instance).or_default());
    }
}

fn constant_value(view: &NodeView) -> Option<Logical> {
    use livetree_kernel::decl::{DeclKind, LeafCheck};
    match &view.decl.kind {
        DeclKind::Leaf {
            check: LeafCheck::Constant(value),
        } => Some(*value),
        DeclKind::Leaf {
            check: LeafCheck::External(spec),
        } if spec.kind == "constant" => Some(
            spec.params
                .get("value")
                .and_then(serde_json::Value::as_bool)
                .map_or(Logical::Unknown, Logical::from),
        ),
        _ => None,
    }
}

impl NodeLifecycle for RecordingLifecycle {
    fn start(&self, request: &StartRequest) -> Result<StartAck, LifecycleError> {
        let mode = *self.mode.lock();
        if mode == StartMode::Fail {
            return Err(LifecycleError::StartFailed {
                path: request.root.path.clone(),
                reason: "refused by test".into(),
            });
        }
        for view in &request.nodes {
            self.record(view, |c| c.starts += 1);
        }
        if mode == StartMode::Silent {
            let (signal, ack) = StartAck::pending();
            self.held.lock().push(signal);
            return Ok(ack);
        }
        if let Some(tree) = self.tree.lock().upgrade() {
            for view in request.leaves() {
                if let Some(value) = constant_value(view) {
                    tree.commit(view.node, value);
                }
            }
        }
        Ok(StartAck::ready())
    }

    fn dispose(&self, node: &NodeView) {
        self.record(node, |c| c.disposes += 1);
    }
}

/// Observer collecting notifications
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub invalidated: Mutex<Vec<TreePath>>,
    pub reports: Mutex<Vec<ReconcileReport>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ReconcileObserver for RecordingObserver {
    fn node_invalidated(&self, node: &NodeView) {
        self.invalidated.lock().push(node.path.clone());
    }

    fn reconciled(&self, report: &ReconcileReport) {
        self.reports.lock().push(report.clone());
    }
}

/// Every reference held by the registries of every active composite
/// resolves to a live node of the active tree
pub fn assert_no_stale_refs(tree: &TaskTree) {
    let mut composites = Vec::new();
    tree.traverse(tree.root(), (), |handle, node, ()| {
        if node.is_composite() {
            composites.push((handle, node.path.clone()));
        }
        livetree_kernel::tree::arena::Visit::Descend(())
    });
    for (handle, owner) in composites {
        let registries: RegistrySet = tree
            .registries(handle)
            .unwrap_or_else(|| panic!("{owner} has no registries"));
        for node in registries.node_refs() {
            let live = tree
                .resolve(node)
                .unwrap_or_else(|| panic!("{owner} holds a stale reference {node:?}"));
            assert!(tree.is_attached(live), "{owner} references a detached node {node:?}");
        }
    }
}

/// Instance ids of the active tree keyed by path
pub fn instances(tree: &TaskTree) -> HashMap<String, InstanceId> {
    tree.snapshot()
        .root
        .iter()
        .map(|n| (n.path.to_string(), n.instance))
        .collect()
}
