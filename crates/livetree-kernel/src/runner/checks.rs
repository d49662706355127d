//! Leaf checks and the factory that resolves them by kind

use crate::decl::{CheckSpec, LeafCheck};
use crate::error::LifecycleError;
use crate::types::Logical;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Work performed by a leaf on every trigger
#[async_trait]
pub trait Check: Send + Sync + fmt::Debug {
    /// Compute the leaf's current result
    ///
    /// # Errors
    /// Returns error if the result cannot be computed; the leaf then
    /// reports `Unknown`
    async fn evaluate(&self) -> Result<Logical, LifecycleError>;
}

/// Resolves check declarations into runnable checks
pub trait CheckFactory: Send + Sync {
    /// Instantiate the check declared by `spec`
    ///
    /// # Errors
    /// Returns error for an unknown kind or bad parameters
    fn create(&self, spec: &CheckSpec) -> Result<Arc<dyn Check>, LifecycleError>;

    /// Instantiate the check of a leaf declaration
    ///
    /// # Errors
    /// Returns error if an external check cannot be created
    fn for_leaf(&self, check: &LeafCheck) -> Result<Arc<dyn Check>, LifecycleError> {
        match check {
            LeafCheck::External(spec) => self.create(spec),
            LeafCheck::Constant(value) => Ok(Arc::new(ConstantCheck::new(*value))),
        }
    }
}

/// Always reports the same value
#[derive(Debug, Clone, Copy)]
pub struct ConstantCheck {
    value: Logical,
}

impl ConstantCheck {
    /// Check reporting `value`
    #[must_use]
    pub fn new(value: Logical) -> Self {
        Self { value }
    }

    fn from_params(params: &serde_json::Value) -> Result<Self, LifecycleError> {
        let value = match params.get("value") {
            None | Some(serde_json::Value::Null) => Logical::Unknown,
            Some(serde_json::Value::Bool(b)) => Logical::from(*b),
            Some(other) => {
                return Err(LifecycleError::InvalidCheck {
                    kind: "constant".into(),
                    reason: format!("`value` must be a boolean or null, got {other}"),
                })
            }
        };
        Ok(Self::new(value))
    }
}

#[async_trait]
impl Check for ConstantCheck {
    async fn evaluate(&self) -> Result<Logical, LifecycleError> {
        Ok(self.value)
    }
}

/// Alternates between true and false on every evaluation
#[derive(Debug)]
pub struct ToggleCheck {
    next: AtomicBool,
}

impl ToggleCheck {
    /// Toggle whose first result is `initial`
    #[must_use]
    pub fn new(initial: bool) -> Self {
        Self {
            next: AtomicBool::new(initial),
        }
    }

    fn from_params(params: &serde_json::Value) -> Result<Self, LifecycleError> {
        match params.get("initial") {
            None | Some(serde_json::Value::Null) => Ok(Self::new(false)),
            Some(serde_json::Value::Bool(b)) => Ok(Self::new(*b)),
            Some(other) => Err(LifecycleError::InvalidCheck {
                kind: "toggle".into(),
                reason: format!("`initial` must be a boolean, got {other}"),
            }),
        }
    }
}

#[async_trait]
impl Check for ToggleCheck {
    async fn evaluate(&self) -> Result<Logical, LifecycleError> {
        Ok(Logical::from(self.next.fetch_xor(true, Ordering::AcqRel)))
    }
}

type Constructor = Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Check>, LifecycleError> + Send + Sync>;

/// Check kinds by name
#[derive(Clone)]
pub struct CheckRegistry {
    kinds: HashMap<String, Constructor>,
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.kinds.keys().collect();
        kinds.sort();
        f.debug_struct("CheckRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CheckRegistry {
    /// Registry without any kind
    #[must_use]
    pub fn empty() -> Self {
        Self { kinds: HashMap::new() }
    }

    /// Registry with the `constant` and `toggle` kinds
    #[must_use]
    pub fn builtin() -> Self {
        Self::empty()
            .with_kind("constant", |params| {
                Ok(Arc::new(ConstantCheck::from_params(params)?) as Arc<dyn Check>)
            })
            .with_kind("toggle", |params| {
                Ok(Arc::new(ToggleCheck::from_params(params)?) as Arc<dyn Check>)
            })
    }

    /// Add or replace a kind
    #[must_use]
    pub fn with_kind<F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Check>, LifecycleError> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.into(), Arc::new(constructor));
        self
    }

    /// Whether `kind` is known
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }
}

impl CheckFactory for CheckRegistry {
    fn create(&self, spec: &CheckSpec) -> Result<Arc<dyn Check>, LifecycleError> {
        let constructor = self
            .kinds
            .get(&spec.kind)
            .ok_or_else(|| LifecycleError::UnknownCheck(spec.kind.clone()))?;
        constructor(&spec.params)
    }
}
