use livetree_kernel::prelude::*;
use livetree_kernel::lifecycle::{NodeLifecycle, StartRequest};
use livetree_test_utils::{abc_spec, abc_spec_with_y2, assert_no_stale_refs, instances, nested_spec, path, RecordingLifecycle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn test_commits_keep_flowing_during_reconcile() {
    let tree = Arc::new(TaskTree::from_spec(&abc_spec()).unwrap());
    let lifecycle = RecordingLifecycle::new();
    lifecycle.start_tree(&tree);

    let targets: Vec<NodeRef> = ["root/a/x", "root/a/y", "root/a/z"]
        .iter()
        .map(|p| tree.view_at(&path(p)).unwrap().node)
        .collect();
    let stop = Arc::new(AtomicBool::new(false));
    let applied = Arc::new(AtomicUsize::new(0));
    let ignored = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = targets
        .into_iter()
        .map(|node| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            let applied = Arc::clone(&applied);
            let ignored = Arc::clone(&ignored);
            std::thread::spawn(move || {
                let mut value = true;
                while !stop.load(Ordering::Acquire) {
                    match tree.commit(node, Logical::from(value)) {
                        Commit::Applied => applied.fetch_add(1, Ordering::Relaxed),
                        Commit::Ignored => ignored.fetch_add(1, Ordering::Relaxed),
                    };
                    value = !value;
                    std::thread::yield_now();
                }
            })
        })
        .collect();

    for _ in 0..5 {
        for spec in [abc_spec_with_y2(), abc_spec()] {
            let staged = tree.stage(&spec).unwrap();
            Reconciler::new(ReconcileConfig::default(), lifecycle.clone())
                .reconcile(&tree, staged)
                .unwrap();
        }
    }
    stop.store(true, Ordering::Release);
    for writer in writers {
        writer.join().unwrap();
    }

    assert!(applied.load(Ordering::Relaxed) > 0);
    // the original y was replaced in the first pass, so its writer only hits released nodes after that
    assert!(ignored.load(Ordering::Relaxed) > 0);
    assert!(lifecycle.double_disposed().is_empty());
    assert_no_stale_refs(&tree);
    assert_eq!(tree.arena_len(), tree.len());
}

/// Takes a snapshot from inside the start callback, on the reconciling thread
#[derive(Debug)]
struct SnapshottingLifecycle {
    tree: std::sync::Weak<TaskTree>,
    seen: AtomicUsize,
}

impl NodeLifecycle for SnapshottingLifecycle {
    fn start(&self, _request: &StartRequest) -> Result<StartAck, LifecycleError> {
        let tree = self.tree.upgrade().ok_or(LifecycleError::TreeDropped)?;
        assert!(tree.is_mutating());
        let snap = tree.snapshot();
        self.seen.fetch_add(snap.len(), Ordering::Relaxed);
        Ok(StartAck::ready())
    }

    fn dispose(&self, _node: &NodeView) {}
}

#[test]
fn test_snapshot_is_reentrant_on_reconciling_thread() {
    let tree = Arc::new(TaskTree::from_spec(&abc_spec()).unwrap());
    let lifecycle = Arc::new(SnapshottingLifecycle {
        tree: Arc::downgrade(&tree),
        seen: AtomicUsize::new(0),
    });
    let staged = tree.stage(&abc_spec_with_y2()).unwrap();
    Reconciler::new(ReconcileConfig::default(), lifecycle.clone())
        .reconcile(&tree, staged)
        .unwrap();
    assert!(lifecycle.seen.load(Ordering::Relaxed) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_runner_end_to_end() {
    let tree = Arc::new(TaskTree::from_spec(&abc_spec()).unwrap());
    let runner = Arc::new(TokioRunner::new(Handle::current(), &tree));
    let ack = runner.start_all().unwrap();
    assert!(tokio::task::spawn_blocking(move || ack.wait(Duration::from_secs(5)))
        .await
        .unwrap());
    assert_eq!(tree.snapshot().root.logical, Logical::True);
    let before = instances(&tree);

    let staged = tree.stage(&abc_spec_with_y2()).unwrap();
    let reconciler = Reconciler::new(ReconcileConfig::default(), runner.clone());
    let worker = Arc::clone(&tree);
    let report = tokio::task::spawn_blocking(move || reconciler.reconcile(&worker, staged))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.spliced, vec![path("root/a")]);
    let after = instances(&tree);
    assert_eq!(after["root/a/x"], before["root/a/x"]);
    let snap = tree.snapshot();
    assert_eq!(snap.find(&path("root/a/y2")).unwrap().logical, Logical::False);
    assert_eq!(snap.root.logical, Logical::False);

    // x, y2 and z run; the old y and the placeholders were aborted
    assert_eq!(runner.running(), 3);
    assert_no_stale_refs(&tree);
    runner.shutdown();
    assert_eq!(runner.running(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_runner_interval_leaves_survive_reload() {
    let mut spec = nested_spec();
    spec.root
        .child_mut("c")
        .unwrap()
        .children
        .push(livetree_test_utils::toggle("t").with_interval_ms(5));
    let tree = Arc::new(TaskTree::from_spec(&spec).unwrap());
    let runner = Arc::new(TokioRunner::new(Handle::current(), &tree));
    let ack = runner.start_all().unwrap();
    assert!(tokio::task::spawn_blocking(move || ack.wait(Duration::from_secs(5)))
        .await
        .unwrap());

    let t = tree.view_at(&path("root/c/t")).unwrap();
    let mut candidate = spec.clone();
    candidate.root.child_mut("a").unwrap().children.remove(0);
    let staged = tree.stage(&candidate).unwrap();
    let reconciler = Reconciler::new(ReconcileConfig::default(), runner.clone());
    let worker = Arc::clone(&tree);
    tokio::task::spawn_blocking(move || reconciler.reconcile(&worker, staged))
        .await
        .unwrap()
        .unwrap();

    // the timer leaf in the untouched branch keeps its identity and keeps ticking
    assert_eq!(tree.resolve(t.node), Some(t.node.handle));
    assert!(t.runtime.state().last_event.is_some());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!t.runtime.is_released());
    runner.shutdown();
}
