use livetree_kernel::prelude::*;
use livetree_test_utils::{abc_spec, abc_spec_with_y2, instances, RecordingLifecycle, StartMode};
use std::time::{Duration, Instant};

fn live() -> (Arc<TaskTree>, Arc<RecordingLifecycle>) {
    let tree = Arc::new(TaskTree::from_spec(&abc_spec()).unwrap());
    let lifecycle = RecordingLifecycle::new();
    lifecycle.start_tree(&tree);
    (tree, lifecycle)
}

fn guard_released(tree: &Arc<TaskTree>) -> bool {
    let other = Arc::clone(tree);
    !tree.is_mutating() && std::thread::spawn(move || other.try_snapshot().is_some()).join().unwrap()
}

#[test]
fn test_missing_correlation_is_fatal() {
    let (tree, lifecycle) = live();
    let mut candidate = abc_spec();
    candidate.root.id = "main".into();
    let staged = tree.stage(&candidate).unwrap();
    let before = instances(&tree);

    let err = Reconciler::new(ReconcileConfig::default(), lifecycle)
        .reconcile(&tree, staged)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingCorrelation { ref path } if path.to_string() == "root"));
    assert!(err.is_invariant_violation());
    assert!(guard_released(&tree));
    assert_eq!(instances(&tree), before);
    assert_eq!(tree.arena_len(), tree.len(), "candidate remnants released");
}

#[test]
fn test_start_timeout_aborts_pass() {
    let (tree, lifecycle) = live();
    lifecycle.set_mode(StartMode::Silent);
    let staged = tree.stage(&abc_spec_with_y2()).unwrap();
    let config = ReconcileConfig::default().with_start_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = Reconciler::new(config, lifecycle.clone())
        .reconcile(&tree, staged)
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(err, ReconcileError::StartTimeout { timeout_ms: 50, .. }));
    assert!(!err.is_invariant_violation());
    assert!(guard_released(&tree));

    // the detached node was disposed on the way out; the tree stays consistent
    assert!(lifecycle.double_disposed().is_empty());
    assert_eq!(tree.arena_len(), tree.len());
    assert!(tree.snapshot().find(&"root/a".parse().unwrap()).is_some());
}

#[test]
fn test_start_failure_is_surfaced() {
    let (tree, lifecycle) = live();
    lifecycle.set_mode(StartMode::Fail);
    let staged = tree.stage(&abc_spec_with_y2()).unwrap();

    let err = Reconciler::new(ReconcileConfig::default(), lifecycle)
        .reconcile(&tree, staged)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Lifecycle(LifecycleError::StartFailed { .. })));
    assert!(guard_released(&tree));
    assert_eq!(tree.arena_len(), tree.len());
}

#[test]
fn test_late_commit_to_disposed_node_is_ignored() {
    let (tree, lifecycle) = live();
    let old_y = tree.view_at(&"root/a/y".parse().unwrap()).unwrap();
    let staged = tree.stage(&abc_spec_with_y2()).unwrap();
    Reconciler::new(ReconcileConfig::default(), lifecycle)
        .reconcile(&tree, staged)
        .unwrap();

    assert!(old_y.runtime.is_released());
    assert_eq!(tree.commit(old_y.node, Logical::True), Commit::Ignored);
    assert_eq!(tree.fire(old_y.node, "Done"), Commit::Ignored);
    assert_eq!(tree.resolve(old_y.node), None);
}

#[test]
fn test_discarded_stage_leaves_no_trace() {
    let (tree, _lifecycle) = live();
    let before = tree.arena_len();
    let staged = tree.stage(&abc_spec_with_y2()).unwrap();
    assert!(tree.arena_len() > before);
    tree.discard(staged);
    assert_eq!(tree.arena_len(), before);
}

#[test]
fn test_build_errors() {
    let dup = TreeSpec::new(NodeSpec::composite(
        "root",
        vec![livetree_test_utils::constant("x", true), livetree_test_utils::constant("x", false)],
    ));
    assert!(matches!(
        TaskTree::from_spec(&dup),
        Err(livetree_kernel::BuildError::DuplicateId { .. })
    ));

    let bad_ref = TreeSpec::new(
        NodeSpec::composite("root", vec![livetree_test_utils::constant("x", true)]).with_expression(Expr::Ref("y".into())),
    );
    assert!(matches!(
        TaskTree::from_spec(&bad_ref),
        Err(livetree_kernel::BuildError::UnknownReference { .. })
    ));
}
