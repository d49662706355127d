//! Error types for the livetree kernel
//!
//! - [`ReconcileError`]: fatal failures of a reconciliation pass
//! - [`BuildError`]: a tree spec that cannot be turned into nodes
//! - [`SpecError`]: loading a tree spec from text or disk
//! - [`LifecycleError`]: failures reported by the node run mechanism
//! - [`ConfigError`]: loading [`crate::config::ReconcileConfig`]

use crate::path::{PathError, TreePath};
use crate::reconcile::phase::PhaseError;
use crate::types::NodeHandle;

/// Failure of a reconciliation pass.
///
/// None of these are retried. The pass is aborted, the structural guard and
/// the candidate remnants are released, and the error is surfaced.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// An active path has no counterpart in the candidate index
    #[error("missing correlation: active node '{path}' has no candidate counterpart")]
    MissingCorrelation {
        /// Path present in the active tree only
        path: TreePath,
    },

    /// A node's recorded parent does not list it among its children
    #[error("missing parent slot: '{path}' is not among its parent's children")]
    MissingParentSlot {
        /// Path of the orphaned node
        path: TreePath,
    },

    /// A handle no longer points at a node
    #[error("node {handle:?} is not present in the arena")]
    MissingNode {
        /// Dangling handle
        handle: NodeHandle,
    },

    /// A composite node came without its registry set
    #[error("composite '{path}' has no registry set")]
    MissingRegistry {
        /// Path of the offending node
        path: TreePath,
    },

    /// Starting or disposing a node failed
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// A started node never acknowledged readiness
    #[error("node '{path}' did not acknowledge start within {timeout_ms}ms")]
    StartTimeout {
        /// Path of the installed node
        path: TreePath,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Splice engine left its state machine
    #[error("splice phase error: {0}")]
    Phase(#[from] PhaseError),
}

impl ReconcileError {
    /// Whether the error signals broken caller assumptions rather than a
    /// failing collaborator
    #[inline]
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingCorrelation { .. }
                | Self::MissingParentSlot { .. }
                | Self::MissingNode { .. }
                | Self::MissingRegistry { .. }
                | Self::Phase(_)
        )
    }
}

/// A tree spec that cannot be materialized
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    /// Two nodes share an id
    #[error("duplicate node id '{id}'")]
    DuplicateId {
        /// Offending id
        id: String,
    },

    /// Expression refers to something that is not a direct child
    #[error("node '{node}' refers to unknown child '{reference}'")]
    UnknownReference {
        /// Composite declaring the expression
        node: String,
        /// Missing child id
        reference: String,
    },

    /// A node with a check also declares children
    #[error("leaf '{id}' declares children")]
    LeafWithChildren {
        /// Offending id
        id: String,
    },

    /// Id unusable as a path segment
    #[error("invalid node id: {0}")]
    InvalidId(#[from] PathError),
}

/// Loading a tree spec
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// File could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML source did not parse
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON source did not parse
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML source did not parse
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// File extension not recognized
    #[error("unsupported spec format: {0}")]
    UnsupportedFormat(String),
}

/// Failure reported by the node run mechanism
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Node could not be started
    #[error("failed to start '{path}': {reason}")]
    StartFailed {
        /// Node being started
        path: TreePath,
        /// Collaborator-provided reason
        reason: String,
    },

    /// No check implementation registered for a kind
    #[error("unknown check kind '{0}'")]
    UnknownCheck(String),

    /// Check parameters rejected
    #[error("invalid parameters for check '{kind}': {reason}")]
    InvalidCheck {
        /// Check kind
        kind: String,
        /// Why the parameters were rejected
        reason: String,
    },

    /// The tree a runner was bound to is gone
    #[error("task tree dropped")]
    TreeDropped,
}

/// Loading reconciliation settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
