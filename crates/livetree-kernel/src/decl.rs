//! Configuration-derived node state
//!
//! A [`NodeDecl`] is everything about a node that comes from configuration
//! and nothing that comes from running it. Node equality is decided on
//! declarations alone (see [`crate::equality`]).

use crate::types::Logical;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque external check: a plug-in kind plus its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    /// Plug-in kind, resolved by the runner
    pub kind: String,
    /// Kind-specific parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CheckSpec {
    /// Create a check spec
    #[must_use]
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// Trigger wiring of a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerDecl {
    /// Events this node's trigger reacts to
    #[serde(default)]
    pub events: Vec<String>,
    /// Re-run period for timer-driven leaves
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

/// Logger wiring of a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoggerDecl {
    /// Events written to the node's log
    #[serde(default)]
    pub events: Vec<String>,
}

/// Settings shared by both node variants
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Trigger declaration
    #[serde(default)]
    pub trigger: Option<TriggerDecl>,
    /// Logger declaration
    #[serde(default)]
    pub logger: Option<LoggerDecl>,
    /// Registered as a root-level "last chance" handler
    #[serde(default)]
    pub last_chance: bool,
}

/// Logical expression of a composite node over its direct children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Result of the child with this id
    Ref(String),
    /// Negation
    Not(Box<Expr>),
    /// Conjunction, `True` when empty
    And(Vec<Expr>),
    /// Disjunction, `False` when empty
    Or(Vec<Expr>),
    /// Fixed value
    Const(Logical),
}

impl Expr {
    /// Conjunction over the given child ids
    #[must_use]
    pub fn all_of<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::And(ids.into_iter().map(|id| Self::Ref(id.into())).collect())
    }

    /// Evaluate with Kleene logic; unresolved references read as `Unknown`
    pub fn evaluate(&self, lookup: &impl Fn(&str) -> Option<Logical>) -> Logical {
        match self {
            Self::Ref(id) => lookup(id).unwrap_or_default(),
            Self::Not(inner) => inner.evaluate(lookup).not(),
            Self::And(items) => items
                .iter()
                .fold(Logical::True, |acc, e| acc.and(e.evaluate(lookup))),
            Self::Or(items) => items
                .iter()
                .fold(Logical::False, |acc, e| acc.or(e.evaluate(lookup))),
            Self::Const(value) => *value,
        }
    }

    /// Every child id referenced by the expression
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Ref(id) => out.push(id),
            Self::Not(inner) => inner.collect_refs(out),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            Self::Const(_) => {}
        }
    }
}

/// What a leaf evaluates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafCheck {
    /// Plug-in check run by the lifecycle collaborator
    External(CheckSpec),
    /// Inert constant; used for placeholders during a splice
    Constant(Logical),
}

/// Variant-specific declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    /// Node owning children
    Composite {
        /// Aggregate over the children
        expression: Expr,
        /// Child ids in slot order
        children: Vec<String>,
    },
    /// Childless node
    Leaf {
        /// Check evaluated by the leaf
        check: LeafCheck,
    },
}

/// Configuration-derived state of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDecl {
    /// Id, unique within a tree and used as the path segment
    pub id: String,
    /// Display name, also the key of name indexes
    pub name: String,
    /// Trigger, logger and handler settings
    #[serde(default)]
    pub settings: NodeSettings,
    /// Variant
    pub kind: DeclKind,
    /// Free-form attributes; compared, never interpreted
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NodeDecl {
    /// Whether this declares a composite node
    #[inline]
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self.kind, DeclKind::Composite { .. })
    }

    /// Inert leaf standing in for a child during a splice.
    ///
    /// Keeps the id so the parent expression still resolves it.
    #[must_use]
    pub fn placeholder(id: impl Into<String>, value: Logical) -> Self {
        Self {
            id: id.into(),
            name: format!("@BOOL.{value}"),
            settings: NodeSettings::default(),
            kind: DeclKind::Leaf {
                check: LeafCheck::Constant(value),
            },
            attributes: BTreeMap::new(),
        }
    }

    /// Whether this is a splice placeholder
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Leaf {
                check: LeafCheck::Constant(_)
            }
        ) && self.name.starts_with("@BOOL.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(values: &'a [(&'a str, Logical)]) -> impl Fn(&str) -> Option<Logical> + 'a {
        move |id| values.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
    }

    #[test]
    fn expr_and_over_children() {
        let expr = Expr::all_of(["x", "y"]);
        let values = [("x", Logical::True), ("y", Logical::True)];
        assert_eq!(expr.evaluate(&lookup(&values)), Logical::True);

        let values = [("x", Logical::True)];
        assert_eq!(expr.evaluate(&lookup(&values)), Logical::Unknown);
    }

    #[test]
    fn expr_or_not_const() {
        let expr = Expr::Or(vec![
            Expr::Not(Box::new(Expr::Ref("x".into()))),
            Expr::Const(Logical::False),
        ]);
        let values = [("x", Logical::False)];
        assert_eq!(expr.evaluate(&lookup(&values)), Logical::True);
        assert_eq!(expr.references(), vec!["x"]);
    }

    #[test]
    fn expr_deserializes_from_yaml() {
        let expr: Expr = serde_yaml::from_str("and: [{ref: x}, {not: {ref: y}}]").unwrap();
        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::Ref("x".into()),
                Expr::Not(Box::new(Expr::Ref("y".into())))
            ])
        );
    }

    #[test]
    fn placeholder_carries_value() {
        let decl = NodeDecl::placeholder("y", Logical::True);
        assert_eq!(decl.name, "@BOOL.True");
        assert!(decl.is_placeholder());
        assert!(!decl.is_composite());
    }
}
