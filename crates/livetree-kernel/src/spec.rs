//! Serializable tree descriptions
//!
//! A [`TreeSpec`] is what configuration parsing hands the kernel. It can be
//! loaded from YAML, JSON or TOML, or assembled in code with the builder
//! methods on [`NodeSpec`].
//!
//! ```yaml
//! root:
//!   id: root
//!   children:
//!     - id: deploy
//!       expression: { and: [{ ref: build }, { ref: smoke }] }
//!       children:
//!         - id: build
//!           check: { kind: constant, params: { value: true } }
//!           trigger: { events: [Built], interval_ms: 1000 }
//!         - id: smoke
//!           check: { kind: toggle }
//! ```

use crate::decl::{CheckSpec, DeclKind, Expr, LeafCheck, LoggerDecl, NodeDecl, NodeSettings, TriggerDecl};
use crate::error::SpecError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Worker declared by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Event the worker reacts to
    pub event: String,
    /// Source id; defaults to the declaring node
    #[serde(default)]
    pub source: Option<String>,
    /// Path of the node the worker drives
    pub slave_path: String,
}

/// Checker registered on a composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerSpec {
    /// Registration key
    pub key: String,
    /// Check to evaluate
    pub check: CheckSpec,
}

/// Leaf evaluated outside the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLeafSpec {
    /// Leaf id
    pub id: String,
    /// Check to evaluate
    pub check: CheckSpec,
}

/// One node of a tree description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Id, unique within the tree
    pub id: String,
    /// Display name, defaults to the id
    #[serde(default)]
    pub name: Option<String>,
    /// Composite expression, defaults to the conjunction of all children
    #[serde(default)]
    pub expression: Option<Expr>,
    /// Leaf check; a node with a check is a leaf
    #[serde(default)]
    pub check: Option<CheckSpec>,
    /// Trigger declaration
    #[serde(default)]
    pub trigger: Option<TriggerDecl>,
    /// Logger declaration
    #[serde(default)]
    pub logger: Option<LoggerDecl>,
    /// Root-level "last chance" handler
    #[serde(default)]
    pub last_chance: bool,
    /// Free-form attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Children in slot order
    #[serde(default)]
    pub children: Vec<NodeSpec>,
    /// Workers declared by this node
    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
    /// Connector checkers (composites only)
    #[serde(default)]
    pub connectors: Vec<CheckerSpec>,
    /// Tree-external checkers (composites only)
    #[serde(default)]
    pub external_checkers: Vec<CheckerSpec>,
    /// Tree-external leaves (composites only)
    #[serde(default)]
    pub external_leaves: Vec<ExternalLeafSpec>,
}

impl NodeSpec {
    fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            expression: None,
            check: None,
            trigger: None,
            logger: None,
            last_chance: false,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            workers: Vec::new(),
            connectors: Vec::new(),
            external_checkers: Vec::new(),
            external_leaves: Vec::new(),
        }
    }

    /// Leaf running `check`
    #[must_use]
    pub fn leaf(id: impl Into<String>, check: CheckSpec) -> Self {
        Self {
            check: Some(check),
            ..Self::bare(id)
        }
    }

    /// Composite over `children`
    #[must_use]
    pub fn composite(id: impl Into<String>, children: Vec<NodeSpec>) -> Self {
        Self {
            children,
            ..Self::bare(id)
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the composite expression
    #[must_use]
    pub fn with_expression(mut self, expression: Expr) -> Self {
        self.expression = Some(expression);
        self
    }

    /// Add trigger events
    #[must_use]
    pub fn with_trigger<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trigger = self.trigger.get_or_insert_with(TriggerDecl::default);
        trigger.events.extend(events.into_iter().map(Into::into));
        self
    }

    /// Re-run interval of the trigger
    #[must_use]
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.trigger.get_or_insert_with(TriggerDecl::default).interval_ms = Some(interval_ms);
        self
    }

    /// Add logger events
    #[must_use]
    pub fn with_logger<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let logger = self.logger.get_or_insert_with(LoggerDecl::default);
        logger.events.extend(events.into_iter().map(Into::into));
        self
    }

    /// Register as last-chance handler
    #[must_use]
    pub fn with_last_chance(mut self) -> Self {
        self.last_chance = true;
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Declare a worker
    #[must_use]
    pub fn with_worker(mut self, event: impl Into<String>, slave_path: impl Into<String>) -> Self {
        self.workers.push(WorkerSpec {
            event: event.into(),
            source: None,
            slave_path: slave_path.into(),
        });
        self
    }

    /// Register a connector checker
    #[must_use]
    pub fn with_connector(mut self, key: impl Into<String>, check: CheckSpec) -> Self {
        self.connectors.push(CheckerSpec {
            key: key.into(),
            check,
        });
        self
    }

    /// Register a tree-external checker
    #[must_use]
    pub fn with_external_checker(mut self, key: impl Into<String>, check: CheckSpec) -> Self {
        self.external_checkers.push(CheckerSpec {
            key: key.into(),
            check,
        });
        self
    }

    /// Register a tree-external leaf
    #[must_use]
    pub fn with_external_leaf(mut self, id: impl Into<String>, check: CheckSpec) -> Self {
        self.external_leaves.push(ExternalLeafSpec {
            id: id.into(),
            check,
        });
        self
    }

    /// Whether this describes a leaf
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.check.is_some()
    }

    /// Display name, defaulting to the id
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Declaration derived from this node description
    #[must_use]
    pub fn decl(&self) -> NodeDecl {
        let kind = match &self.check {
            Some(check) => DeclKind::Leaf {
                check: LeafCheck::External(check.clone()),
            },
            None => {
                let children: Vec<String> = self.children.iter().map(|c| c.id.clone()).collect();
                DeclKind::Composite {
                    expression: self
                        .expression
                        .clone()
                        .unwrap_or_else(|| Expr::all_of(children.iter().cloned())),
                    children,
                }
            }
        };
        NodeDecl {
            id: self.id.clone(),
            name: self.display_name().to_string(),
            settings: NodeSettings {
                trigger: self.trigger.clone(),
                logger: self.logger.clone(),
                last_chance: self.last_chance,
            },
            kind,
            attributes: self.attributes.clone(),
        }
    }

    /// Child with the given id
    #[must_use]
    pub fn child(&self, id: &str) -> Option<&NodeSpec> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Mutable child with the given id
    pub fn child_mut(&mut self, id: &str) -> Option<&mut NodeSpec> {
        self.children.iter_mut().find(|c| c.id == id)
    }
}

/// Description of a whole tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSpec {
    /// Root node
    pub root: NodeSpec,
}

impl TreeSpec {
    /// Wrap a root node
    #[must_use]
    pub fn new(root: NodeSpec) -> Self {
        Self { root }
    }

    /// Parse YAML
    ///
    /// # Errors
    /// Returns error on malformed input
    pub fn from_yaml_str(s: &str) -> Result<Self, SpecError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Parse JSON
    ///
    /// # Errors
    /// Returns error on malformed input
    pub fn from_json_str(s: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns error on malformed input
    pub fn from_toml_str(s: &str) -> Result<Self, SpecError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a file, picking the format by extension
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(SpecError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Logical;

    const SAMPLE: &str = r"
root:
  id: root
  children:
    - id: deploy
      expression: { and: [{ ref: build }, { not: { ref: smoke } }] }
      children:
        - id: build
          check: { kind: constant, params: { value: true } }
          trigger: { events: [Built], interval_ms: 1000 }
        - id: smoke
          check: { kind: toggle }
";

    #[test]
    fn yaml_spec_parses() {
        let spec = TreeSpec::from_yaml_str(SAMPLE).unwrap();
        let deploy = spec.root.child("deploy").unwrap();
        assert!(!deploy.is_leaf());
        assert!(deploy.child("build").unwrap().is_leaf());
        let trigger = deploy.child("build").unwrap().trigger.as_ref().unwrap();
        assert_eq!(trigger.interval_ms, Some(1000));
    }

    #[test]
    fn default_expression_is_conjunction() {
        let node = NodeSpec::composite(
            "a",
            vec![
                NodeSpec::leaf("x", CheckSpec::new("toggle", serde_json::Value::Null)),
                NodeSpec::leaf("y", CheckSpec::new("toggle", serde_json::Value::Null)),
            ],
        );
        match node.decl().kind {
            DeclKind::Composite { expression, children } => {
                assert_eq!(expression, Expr::all_of(["x", "y"]));
                assert_eq!(children, vec!["x".to_string(), "y".to_string()]);
            }
            DeclKind::Leaf { .. } => panic!("expected composite"),
        }
    }

    #[test]
    fn json_and_toml_agree() {
        let json = r#"{"root": {"id": "root", "children": [{"id": "x", "check": {"kind": "constant", "params": {"value": false}}}]}}"#;
        let toml = r#"
[root]
id = "root"

[[root.children]]
id = "x"
check = { kind = "constant", params = { value = false } }
"#;
        assert_eq!(
            TreeSpec::from_json_str(json).unwrap(),
            TreeSpec::from_toml_str(toml).unwrap()
        );
    }

    #[test]
    fn expression_constant_accepts_null() {
        let expr: Expr = serde_json::from_str(r#"{"const": null}"#).unwrap();
        assert_eq!(expr, Expr::Const(Logical::Unknown));
    }

    #[test]
    fn unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            TreeSpec::from_path(&path),
            Err(SpecError::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }
}
