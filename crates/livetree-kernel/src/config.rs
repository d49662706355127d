//! Reconciliation settings

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for a [`crate::reconcile::Reconciler`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// How long to wait for a started node to acknowledge readiness
    pub start_timeout_ms: u64,
    /// Recompute a spliced composite once its relocated children are back
    pub revalidate_after_relocation: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 5_000,
            revalidate_after_relocation: true,
        }
    }
}

impl ReconcileConfig {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start acknowledgment timeout
    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Toggle re-evaluation after relocation
    #[must_use]
    pub fn with_revalidation(mut self, enabled: bool) -> Self {
        self.revalidate_after_relocation = enabled;
        self
    }

    /// Start acknowledgment timeout
    #[inline]
    #[must_use]
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Parse TOML; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error on malformed TOML
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ReconcileConfig::from_toml_str("start_timeout_ms = 250").unwrap();
        assert_eq!(config.start_timeout(), Duration::from_millis(250));
        assert!(config.revalidate_after_relocation);
    }

    #[test]
    fn builder_setters() {
        let config = ReconcileConfig::new()
            .with_start_timeout(Duration::from_secs(2))
            .with_revalidation(false);
        assert_eq!(config.start_timeout_ms, 2_000);
        assert!(!config.revalidate_after_relocation);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconcile.toml");
        std::fs::write(&path, "revalidate_after_relocation = false\n").unwrap();
        let config = ReconcileConfig::from_path(&path).unwrap();
        assert_eq!(config.start_timeout_ms, 5_000);
        assert!(!config.revalidate_after_relocation);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            ReconcileConfig::from_toml_str("start_timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
