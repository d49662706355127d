//! Splice phases and their legal transitions

use serde::Serialize;
use std::fmt;

/// Phase of a single splice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SplicePhase {
    /// Releasing the outdated node from its parent slot
    Detaching,
    /// Wiring the candidate node into the freed slot
    Installing,
    /// Running the installed subtree and waiting for its acknowledgment
    Starting,
    /// Disposing unmatched old children, relocating matched ones
    ReconcilingChildren,
    /// Rewriting registry entries that point at replaced nodes
    Repairing,
    /// Releasing the detached node
    DisposingOld,
    /// Terminal
    Done,
}

impl fmt::Display for SplicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Attempted transition outside the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal splice transition {from} -> {to}")]
pub struct PhaseError {
    /// Current phase
    pub from: SplicePhase,
    /// Requested phase
    pub to: SplicePhase,
}

/// Validates a phase transition.
///
/// With the `strict-debug` feature an illegal transition panics instead.
///
/// # Errors
/// Returns error if `to` does not directly follow `from`
pub fn validate_transition(from: SplicePhase, to: SplicePhase) -> Result<(), PhaseError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        assert!(
            !cfg!(feature = "strict-debug"),
            "Illegal splice transition attempted: {from:?} -> {to:?}"
        );
        Err(PhaseError { from, to })
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: SplicePhase) -> Vec<SplicePhase> {
    use SplicePhase::*;
    match from {
        Detaching => vec![Installing],
        Installing => vec![Starting],
        Starting => vec![ReconcilingChildren],
        ReconcilingChildren => vec![Repairing],
        Repairing => vec![DisposingOld],
        DisposingOld => vec![Done],
        Done => vec![],
    }
}

/// Current phase of one splice, advanced through [`validate_transition`]
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: SplicePhase,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            phase: SplicePhase::Detaching,
        }
    }

    pub(crate) fn current(&self) -> SplicePhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, to: SplicePhase) -> Result<(), PhaseError> {
        validate_transition(self.phase, to)?;
        tracing::debug!(from = %self.phase, to = %to, "splice phase");
        self.phase = to;
        Ok(())
    }
}
