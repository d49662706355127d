//! Boundary to the node run mechanism and to dependent views
//!
//! The reconciler never evaluates nodes itself. It asks a [`NodeLifecycle`]
//! to start freshly installed subtrees and to dispose removed nodes, and
//! tells [`ReconcileObserver`]s when presentation state must refresh.
//!
//! Starting is asynchronous. Instead of sleeping after a start, the engine
//! waits on the [`StartAck`] returned by [`NodeLifecycle::start`], which the
//! collaborator signals once the first results of the started nodes have
//! been committed.

use crate::error::LifecycleError;
use crate::reconcile::ReconcileReport;
use crate::tree::node::NodeView;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Nodes to start: an installed subtree, root first
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Installed node
    pub root: NodeView,
    /// Every node of the installed subtree in pre-order, `root` included
    pub nodes: Vec<NodeView>,
}

impl StartRequest {
    /// Leaves of the request
    pub fn leaves(&self) -> impl Iterator<Item = &NodeView> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }
}

/// Sending half of a start acknowledgment
#[derive(Debug, Clone)]
pub struct StartSignal {
    tx: Sender<()>,
}

impl StartSignal {
    /// Signal readiness; extra calls are harmless
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving half of a start acknowledgment
#[derive(Debug)]
pub struct StartAck {
    rx: Receiver<()>,
}

impl StartAck {
    /// A pending acknowledgment and the signal that completes it
    #[must_use]
    pub fn pending() -> (StartSignal, StartAck) {
        let (tx, rx) = channel::bounded(1);
        (StartSignal { tx }, StartAck { rx })
    }

    /// An acknowledgment that is already complete
    #[must_use]
    pub fn ready() -> Self {
        let (signal, ack) = Self::pending();
        signal.notify();
        ack
    }

    /// Block until signaled. Returns `false` on timeout, or when every
    /// signal was dropped without notifying.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// Run mechanism of nodes
pub trait NodeLifecycle: Send + Sync {
    /// Begin executing the nodes of an installed subtree
    ///
    /// # Errors
    /// Returns error if the subtree cannot be started
    fn start(&self, request: &StartRequest) -> Result<StartAck, LifecycleError>;

    /// Release everything owned by a node. Must be idempotent.
    fn dispose(&self, node: &NodeView);
}

/// Lifecycle that runs nothing and acknowledges immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl NodeLifecycle for NoopLifecycle {
    fn start(&self, _request: &StartRequest) -> Result<StartAck, LifecycleError> {
        Ok(StartAck::ready())
    }

    fn dispose(&self, _node: &NodeView) {}
}

/// Dependents of the tree's shape
pub trait ReconcileObserver: Send + Sync {
    /// A node changed owner without changing state
    fn node_invalidated(&self, _node: &NodeView) {}

    /// A pass completed; dependent views must refresh
    fn reconciled(&self, _report: &ReconcileReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_ack_returns_immediately() {
        assert!(StartAck::ready().wait(Duration::from_millis(1)));
    }

    #[test]
    fn pending_ack_times_out() {
        let (_signal, ack) = StartAck::pending();
        assert!(!ack.wait(Duration::from_millis(10)));
    }

    #[test]
    fn dropped_signal_fails_fast() {
        let (signal, ack) = StartAck::pending();
        drop(signal);
        assert!(!ack.wait(Duration::from_secs(5)));
    }

    #[test]
    fn signal_from_other_thread() {
        let (signal, ack) = StartAck::pending();
        std::thread::spawn(move || {
            signal.notify();
            signal.notify();
        });
        assert!(ack.wait(Duration::from_secs(5)));
    }
}
