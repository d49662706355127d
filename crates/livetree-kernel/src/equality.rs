//! Node equality oracle
//!
//! Two nodes are equal when their declarations are: same variant, same id
//! and name, same settings and, for composites, the same expression over
//! the same ordered child ids. Runtime results, registries and the contents
//! of child subtrees do not take part; child differences are found as the
//! walk descends.

use crate::tree::node::TaskNode;

/// Whether `active` and `candidate` are interchangeable
///
/// A composite whose child list keeps the same ids compares equal even when
/// one of those children changed: the parent keeps its identity and only the
/// child is spliced once the walk reaches it. Adding, removing or renaming a
/// child changes the parent's declaration, so the parent is replaced and its
/// unchanged children are relocated into the replacement.
///
/// Registrations (workers, connectors, external checkers and leaves) are
/// not part of the declaration either. They are synchronized through the
/// registries without replacing any node.
#[inline]
#[must_use]
pub fn nodes_equal(active: &TaskNode, candidate: &TaskNode) -> bool {
    active.is_composite() == candidate.is_composite() && active.decl == candidate.decl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{CheckSpec, Expr};
    use crate::path::TreePath;
    use crate::spec::NodeSpec;
    use crate::types::Logical;
    use std::sync::Arc;

    fn node(spec: &NodeSpec) -> TaskNode {
        TaskNode::new(Arc::new(spec.decl()), TreePath::root(&spec.id), None)
    }

    fn check(value: bool) -> CheckSpec {
        CheckSpec::new("constant", serde_json::json!({ "value": value }))
    }

    #[test]
    fn runtime_state_is_ignored() {
        let spec = NodeSpec::leaf("x", check(true));
        let a = node(&spec);
        let b = node(&spec);
        a.runtime.set(Logical::False);
        assert!(nodes_equal(&a, &b));
    }

    #[test]
    fn check_parameters_matter() {
        assert!(!nodes_equal(
            &node(&NodeSpec::leaf("x", check(true))),
            &node(&NodeSpec::leaf("x", check(false)))
        ));
    }

    #[test]
    fn variants_never_equal() {
        assert!(!nodes_equal(
            &node(&NodeSpec::leaf("x", check(true))),
            &node(&NodeSpec::composite("x", vec![]))
        ));
    }

    #[test]
    fn composite_compares_expression_not_subtree() {
        let a = NodeSpec::composite("a", vec![NodeSpec::leaf("x", check(true))]);
        let same_shape = NodeSpec::composite("a", vec![NodeSpec::leaf("x", check(false))]);
        assert!(nodes_equal(&node(&a), &node(&same_shape)));

        let other_expr = a.clone().with_expression(Expr::Not(Box::new(Expr::Ref("x".into()))));
        assert!(!nodes_equal(&node(&a), &node(&other_expr)));
    }

    #[test]
    fn registrations_do_not_affect_equality() {
        let a = NodeSpec::composite("a", vec![]);
        let b = a.clone().with_external_checker("ext", check(true));
        assert!(nodes_equal(&node(&a), &node(&b)));
    }
}
