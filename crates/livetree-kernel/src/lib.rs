//! livetree kernel
//!
//! A live task tree whose nodes run continuously (checks, timers, triggers)
//! and whose configuration can be reloaded without stopping it:
//! - Unchanged branches keep their runtime state and running work
//! - Changed or new branches are swapped in and started
//! - Removed branches are disposed exactly once
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use livetree_kernel::prelude::*;
//!
//! let tree = Arc::new(TaskTree::from_spec(&TreeSpec::from_path("tree.yaml")?)?);
//! let runner = Arc::new(TokioRunner::new(Handle::current(), &tree));
//! runner.start_all()?;
//!
//! // configuration edited
//! let candidate = tree.stage(&TreeSpec::from_path("tree.yaml")?)?;
//! let report = Reconciler::new(ReconcileConfig::default(), runner).reconcile(&tree, candidate)?;
//! println!("spliced {:?}", report.spliced);
//! ```

// Data model
pub mod decl;
pub mod path;
pub mod types;

// Tree
pub mod builder;
pub mod guard;
pub mod index;
pub mod registry;
pub mod snapshot;
pub mod spec;
pub mod tree;

// Reconciliation
pub mod equality;
pub mod lifecycle;
pub mod reconcile;

// Ambient
pub mod config;
pub mod error;
pub mod runner;

// Re-exports
pub use config::ReconcileConfig;
pub use error::{BuildError, ConfigError, LifecycleError, ReconcileError, SpecError};
pub use lifecycle::{NodeLifecycle, NoopLifecycle, ReconcileObserver, StartAck, StartRequest, StartSignal};
pub use path::TreePath;
pub use reconcile::{ReconcileReport, Reconciler};
pub use snapshot::{NodeSnapshot, TreeSnapshot};
pub use spec::{NodeSpec, TreeSpec};
pub use tree::{Commit, TaskTree};
pub use types::{InstanceId, Logical, NodeHandle, NodeRef};

/// Common imports
pub mod prelude {
    pub use crate::decl::{CheckSpec, Expr, NodeDecl};
    pub use crate::runner::checks::{Check, CheckFactory, CheckRegistry};
    pub use crate::runner::TokioRunner;
    pub use crate::tree::node::NodeView;
    pub use crate::{
        Commit, InstanceId, LifecycleError, Logical, NodeLifecycle, NodeRef, ReconcileConfig, ReconcileError,
        ReconcileObserver, ReconcileReport, Reconciler, StartAck, TaskTree, TreePath, TreeSnapshot, TreeSpec,
        NodeSpec,
    };
    pub use std::sync::Arc;
    pub use tokio::runtime::Handle;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
