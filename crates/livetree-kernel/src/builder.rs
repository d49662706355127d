//! Materializing tree specs into the arena
//!
//! Building runs in three steps:
//! 1. validate the whole spec (ids, references, leaf shape)
//! 2. insert nodes and ownership edges
//! 3. populate registries: propagated entries go to every composite
//!    ancestor, local ones to the declaring composite (or, for workers, to
//!    the parent of the declaring node)

use crate::error::BuildError;
use crate::path::{validate_segment, TreePath};
use crate::registry::{CheckerShell, ExternalLeaf, TriggerShell, WorkerShell};
use crate::spec::NodeSpec;
use crate::tree::arena::Arena;
use crate::tree::node::TaskNode;
use crate::types::NodeHandle;
use std::collections::HashSet;
use std::sync::Arc;

/// Build `spec` into `arena` as a detached tree and return its root.
///
/// # Errors
/// Returns error if the tree description is inconsistent; nothing is inserted then.
pub fn build(arena: &mut Arena, spec: &NodeSpec) -> Result<NodeHandle, BuildError> {
    validate(spec, &mut HashSet::new())?;
    let root = insert(arena, spec, TreePath::root(&spec.id), None);
    register(arena, spec, root, &mut Vec::new());
    tracing::debug!(root = %spec.id, nodes = count(spec), "tree built");
    Ok(root)
}

fn count(spec: &NodeSpec) -> usize {
    1 + spec.children.iter().map(count).sum::<usize>()
}

fn validate<'a>(spec: &'a NodeSpec, seen: &mut HashSet<&'a str>) -> Result<(), BuildError> {
    validate_segment(&spec.id)?;
    if !seen.insert(&spec.id) {
        return Err(BuildError::DuplicateId {
            id: spec.id.clone(),
        });
    }
    if spec.is_leaf() && !spec.children.is_empty() {
        return Err(BuildError::LeafWithChildren {
            id: spec.id.clone(),
        });
    }
    if let Some(expression) = &spec.expression {
        for reference in expression.references() {
            if spec.child(reference).is_none() {
                return Err(BuildError::UnknownReference {
                    node: spec.id.clone(),
                    reference: reference.to_string(),
                });
            }
        }
    }
    for child in &spec.children {
        validate(child, seen)?;
    }
    Ok(())
}

fn insert(arena: &mut Arena, spec: &NodeSpec, path: TreePath, parent: Option<NodeHandle>) -> NodeHandle {
    let handle = arena.add_node(TaskNode::new(Arc::new(spec.decl()), path.clone(), parent));
    for (slot, child) in spec.children.iter().enumerate() {
        let child_handle = insert(arena, child, path.child(&child.id), Some(handle));
        arena.add_edge(handle, child_handle, slot);
    }
    handle
}

/// `ancestors` holds the composite handles above `handle`, root first.
fn register(arena: &mut Arena, spec: &NodeSpec, handle: NodeHandle, ancestors: &mut Vec<NodeHandle>) {
    let node_ref = arena[handle].node_ref(handle);
    let name = spec.display_name().to_string();

    let triggers: Vec<Arc<TriggerShell>> = spec
        .trigger
        .iter()
        .flat_map(|t| {
            t.events.iter().map(move |event| {
                Arc::new(TriggerShell {
                    event: event.clone(),
                    source: spec.id.clone(),
                    owner: node_ref,
                    decl: t.clone(),
                })
            })
        })
        .collect();
    let logger_events: Vec<String> = spec
        .logger
        .as_ref()
        .map(|l| l.events.clone())
        .unwrap_or_default();

    for ancestor in ancestors.iter() {
        let Some(reg) = arena[*ancestor].registries_mut() else {
            continue;
        };
        reg.nodes_by_id.entry(spec.id.clone()).or_insert(node_ref);
        if !spec.is_leaf() {
            reg.jobs_by_name.entry(name.clone()).or_insert(node_ref);
        }
        if spec.last_chance {
            reg.last_chance_by_name.entry(name.clone()).or_insert(node_ref);
        }
        for shell in &triggers {
            reg.insert_trigger(Arc::clone(shell));
        }
        reg.logger_events.extend(logger_events.iter().cloned());
    }

    if let Some(parent) = ancestors.last() {
        if let Some(reg) = arena[*parent].registries_mut() {
            reg.nodes_by_name.entry(name.clone()).or_insert(node_ref);
        }
    }

    let worker_home = ancestors.last().copied().unwrap_or(handle);
    if let Some(reg) = arena[worker_home].registries_mut() {
        for worker in &spec.workers {
            let source = worker.source.as_deref().unwrap_or(&spec.id);
            reg.insert_worker(
                &spec.id,
                &worker.event,
                source,
                Arc::new(WorkerShell {
                    slave_path: worker.slave_path.clone(),
                    owner: node_ref,
                }),
            );
        }
    }

    if let Some(reg) = arena[handle].registries_mut() {
        for connector in &spec.connectors {
            reg.connector_checkers.insert(
                connector.key.clone(),
                Arc::new(CheckerShell {
                    key: connector.key.clone(),
                    owner: node_ref,
                    check: connector.check.clone(),
                }),
            );
        }
        for checker in &spec.external_checkers {
            reg.external_checkers.insert(
                checker.key.clone(),
                Arc::new(CheckerShell {
                    key: checker.key.clone(),
                    owner: node_ref,
                    check: checker.check.clone(),
                }),
            );
        }
        for leaf in &spec.external_leaves {
            reg.insert_external_leaf(Arc::new(ExternalLeaf {
                id: leaf.id.clone(),
                check: leaf.check.clone(),
            }));
        }
    }

    let children = crate::tree::arena::children(arena, handle);
    if children.is_empty() {
        return;
    }
    ancestors.push(handle);
    for (child_spec, child) in spec.children.iter().zip(children) {
        register(arena, child_spec, child, ancestors);
    }
    ancestors.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{CheckSpec, Expr};
    use crate::registry::BREAKED_EVENT;
    use crate::tree::arena::{children, subtree};

    fn check() -> CheckSpec {
        CheckSpec::new("toggle", serde_json::Value::Null)
    }

    fn sample() -> NodeSpec {
        NodeSpec::composite(
            "root",
            vec![
                NodeSpec::composite(
                    "a",
                    vec![
                        NodeSpec::leaf("x", check())
                            .with_trigger(["E1"])
                            .with_worker("Done", "root/a/y"),
                        NodeSpec::leaf("y", check()).with_logger(["Failed"]),
                    ],
                )
                .with_name("Alpha")
                .with_external_checker("ext", check()),
                NodeSpec::leaf("z", check()).with_last_chance(),
            ],
        )
    }

    #[test]
    fn build_links_parents_and_paths() {
        let mut arena = Arena::default();
        let root = build(&mut arena, &sample()).unwrap();
        let handles = subtree(&arena, root);
        let paths: Vec<String> = handles.iter().map(|h| arena[*h].path.to_string()).collect();
        assert_eq!(paths, vec!["root", "root/a", "root/a/x", "root/a/y", "root/z"]);
        for h in &handles[1..] {
            let parent = arena[*h].parent.unwrap();
            assert!(children(&arena, parent).contains(h));
        }
        assert!(arena[root].parent.is_none());
    }

    #[test]
    fn propagated_entries_reach_every_ancestor() {
        let mut arena = Arena::default();
        let root = build(&mut arena, &sample()).unwrap();
        let a = children(&arena, root)[0];
        let x = children(&arena, a)[0];

        let root_reg = arena[root].registries().unwrap();
        assert_eq!(root_reg.nodes_by_id.len(), 4);
        assert_eq!(root_reg.nodes_by_id["x"], arena[x].node_ref(x));
        assert!(root_reg.jobs_by_name.contains_key("Alpha"));
        assert!(root_reg.last_chance_by_name.contains_key("z"));
        assert!(root_reg.trigger_events.contains("E1"));
        assert!(root_reg.logger_events.contains("Failed"));

        let a_reg = arena[a].registries().unwrap();
        assert!(Arc::ptr_eq(
            &a_reg.event_triggers["E1"]["x"],
            &root_reg.event_triggers["E1"]["x"]
        ));
    }

    #[test]
    fn local_entries_stay_local() {
        let mut arena = Arena::default();
        let root = build(&mut arena, &sample()).unwrap();
        let a = children(&arena, root)[0];

        let a_reg = arena[a].registries().unwrap();
        assert_eq!(a_reg.workers["x:Done"]["x"][0].slave_path, "root/a/y");
        assert!(a_reg.external_checkers.contains_key("ext"));
        assert!(a_reg.worker_events.contains(BREAKED_EVENT));
        assert_eq!(a_reg.nodes_by_name.len(), 2);

        let root_reg = arena[root].registries().unwrap();
        assert!(root_reg.workers.is_empty());
        assert!(root_reg.external_checkers.is_empty());
        assert!(root_reg.nodes_by_name.contains_key("Alpha"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let spec = NodeSpec::composite(
            "root",
            vec![
                NodeSpec::composite("a", vec![NodeSpec::leaf("x", check())]),
                NodeSpec::leaf("x", check()),
            ],
        );
        let mut arena = Arena::default();
        assert_eq!(
            build(&mut arena, &spec),
            Err(BuildError::DuplicateId { id: "x".into() })
        );
        assert_eq!(arena.node_count(), 0);
    }

    #[test]
    fn unknown_reference_rejected() {
        let spec = NodeSpec::composite("root", vec![NodeSpec::leaf("x", check())])
            .with_expression(Expr::Ref("nope".into()));
        let mut arena = Arena::default();
        assert!(matches!(
            build(&mut arena, &spec),
            Err(BuildError::UnknownReference { reference, .. }) if reference == "nope"
        ));
    }

    #[test]
    fn leaf_with_children_rejected() {
        let mut spec = NodeSpec::leaf("x", check());
        spec.children.push(NodeSpec::leaf("y", check()));
        let mut arena = Arena::default();
        assert!(matches!(
            build(&mut arena, &spec),
            Err(BuildError::LeafWithChildren { .. })
        ));
    }
}
