//! Configuration types for directory watching.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Default coalescing window for native notifications.
pub const DEFAULT_LATENCY_MS: u64 = 250;

/// Configuration for a single watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Extensions to report file changes for. Empty means every file.
    pub extensions: Vec<String>,

    /// How long the backend buffers changes before delivering a batch.
    pub latency_ms: u64,

    /// Whether subdirectories are watched as well.
    pub recursive: bool,

    /// Report unrecognized notifications as `FileAction::Unknown` instead
    /// of dropping them.
    pub report_unknown: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            latency_ms: DEFAULT_LATENCY_MS,
            recursive: true,
            report_unknown: false,
        }
    }
}

impl WatchConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict reported file changes to the given extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the coalescing window.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Only watch the top-level directory.
    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    /// Surface unrecognized notifications as `FileAction::Unknown`.
    pub fn report_unknown(mut self) -> Self {
        self.report_unknown = true;
        self
    }

    /// The coalescing window as a `Duration`.
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    fn validate(&self) -> Result<()> {
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|ext| ext.contains(['/', '\\']))
        {
            return Err(WatcherError::Config(format!(
                "extension must not contain a path separator: {bad}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::default();
        assert!(config.extensions.is_empty());
        assert_eq!(config.latency(), Duration::from_millis(250));
        assert!(config.recursive);
        assert!(!config.report_unknown);
    }

    #[test]
    fn test_builder() {
        let config = WatchConfig::new()
            .with_extensions(["png", "txt"])
            .with_latency(Duration::from_millis(50))
            .non_recursive();

        assert_eq!(config.extensions, vec!["png".to_string(), "txt".to_string()]);
        assert_eq!(config.latency_ms, 50);
        assert!(!config.recursive);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = WatchConfig::from_json(r#"{ "extensions": ["glsl"] }"#).unwrap();
        assert_eq!(config.extensions, vec!["glsl".to_string()]);
        assert_eq!(config.latency_ms, DEFAULT_LATENCY_MS);
        assert!(config.recursive);
    }

    #[test]
    fn test_from_json_rejects_separator() {
        let result = WatchConfig::from_json(r#"{ "extensions": ["a/b"] }"#);
        assert!(matches!(result, Err(WatcherError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("watch.json");
        std::fs::write(&path, r#"{ "latency_ms": 10, "report_unknown": true }"#).unwrap();

        let config = WatchConfig::load(&path).unwrap();
        assert_eq!(config.latency_ms, 10);
        assert!(config.report_unknown);
    }
}
