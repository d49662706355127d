//! Core identifiers and the three-valued logical result.

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable arena slot of a node.
///
/// Slots are recycled after a node is removed, so anything that outlives
/// a single locked section should hold a [`NodeRef`] instead.
pub type NodeHandle = NodeIndex<u32>;

/// Runtime identity of a constructed node.
///
/// Every node built from a spec (or created as a placeholder) gets a fresh
/// instance id. "Same object" across a reconciliation pass means "same
/// instance id".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Allocate a new random instance id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle paired with the instance it was taken from.
///
/// Resolves only while the slot still holds that same instance, which makes
/// late callbacks into a recycled slot harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    /// Arena slot
    pub handle: NodeHandle,
    /// Instance expected in that slot
    pub instance: InstanceId,
}

impl NodeRef {
    /// Create a reference
    #[inline]
    #[must_use]
    pub const fn new(handle: NodeHandle, instance: InstanceId) -> Self {
        Self { handle, instance }
    }
}

/// Three-valued result of a node evaluation.
///
/// `Unknown` is the "null" state: not yet evaluated, or evaluation
/// inconclusive. Combination follows Kleene logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Logical {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// No result yet
    #[default]
    Unknown,
}

impl Logical {
    /// Kleene conjunction
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Unknown,
        }
    }

    /// Kleene disjunction
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Unknown,
        }
    }

    /// Kleene negation
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }

    /// Whether a definite value is present
    #[inline]
    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl From<Option<bool>> for Logical {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::True,
            Some(false) => Self::False,
            None => Self::Unknown,
        }
    }
}

impl From<Logical> for Option<bool> {
    fn from(value: Logical) -> Self {
        match value {
            Logical::True => Some(true),
            Logical::False => Some(false),
            Logical::Unknown => None,
        }
    }
}

impl From<bool> for Logical {
    fn from(value: bool) -> Self {
        Some(value).into()
    }
}

impl fmt::Display for Logical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kleene_and_or() {
        assert_eq!(Logical::True.and(Logical::Unknown), Logical::Unknown);
        assert_eq!(Logical::False.and(Logical::Unknown), Logical::False);
        assert_eq!(Logical::True.or(Logical::Unknown), Logical::True);
        assert_eq!(Logical::False.or(Logical::Unknown), Logical::Unknown);
        assert_eq!(Logical::Unknown.not(), Logical::Unknown);
        assert_eq!(Logical::True.not(), Logical::False);
    }

    #[test]
    fn logical_serde_as_nullable_bool() {
        assert_eq!(serde_json::to_string(&Logical::True).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Logical::Unknown).unwrap(), "null");
        let parsed: Logical = serde_json::from_str("false").unwrap();
        assert_eq!(parsed, Logical::False);
    }

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }
}
