//! World configuration.

use serde::Deserialize;

/// Configuration for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Number of working stages available during an iteration (at least 1).
    pub working_stages: usize,
    /// Longest prefab chain walked before it is reported as a cycle.
    pub max_prefab_depth: usize,
    /// Check `set` payload sizes against the registered component size.
    pub validate_set_size: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            working_stages: 1,
            max_prefab_depth: 64,
            validate_set_size: cfg!(debug_assertions),
        }
    }
}

impl WorldConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of working stages.
    #[must_use]
    pub fn with_working_stages(mut self, count: usize) -> Self {
        self.working_stages = count.max(1);
        self
    }

    /// Set the prefab chain depth bound.
    #[must_use]
    pub fn with_max_prefab_depth(mut self, depth: usize) -> Self {
        self.max_prefab_depth = depth;
        self
    }

    /// Enable or disable `set` payload size validation.
    #[must_use]
    pub fn with_set_size_validation(mut self, enabled: bool) -> Self {
        self.validate_set_size = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.working_stages, 1);
        assert_eq!(config.max_prefab_depth, 64);
    }

    #[test]
    fn test_builder_clamps_stage_count() {
        let config = WorldConfig::new().with_working_stages(0);
        assert_eq!(config.working_stages, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WorldConfig =
            serde_json::from_str(r#"{ "working_stages": 4, "validate_set_size": true }"#).unwrap();
        assert_eq!(config.working_stages, 4);
        assert_eq!(config.max_prefab_depth, 64);
        assert!(config.validate_set_size);
    }
}
