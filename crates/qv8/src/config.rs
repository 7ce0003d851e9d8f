//! Isolate Configuration

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Seed used when the configured identity hash seed is zero
pub(crate) const DEFAULT_HASH_SEED: u32 = 0x9e37_79b9;

/// Isolate configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolateConfig {
    /// Host heap limit (bytes)
    pub memory_limit: usize,

    /// Host stack limit (bytes)
    pub max_stack_size: usize,

    /// Allocation volume that triggers a host collection, engine default when unset
    pub gc_threshold: Option<usize>,

    /// Seed for the identity hash sequence
    pub identity_hash_seed: u32,

    /// Compile every bridge snippet while the isolate is still pristine
    pub warm_snippets: bool,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            memory_limit: 32 * 1024 * 1024, // 32MB
            max_stack_size: 1024 * 1024,
            gc_threshold: None,
            identity_hash_seed: DEFAULT_HASH_SEED,
            warm_snippets: true,
        }
    }
}

impl IsolateConfig {
    /// Reject settings the host engine cannot run with
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.memory_limit == 0 {
            return Err(BridgeError::Config("memory_limit must be non-zero".into()));
        }
        if self.max_stack_size == 0 {
            return Err(BridgeError::Config("max_stack_size must be non-zero".into()));
        }
        if self.gc_threshold == Some(0) {
            return Err(BridgeError::Config("gc_threshold must be non-zero when set".into()));
        }
        Ok(())
    }

    /// Builder-style memory limit
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Builder-style hash seed
    pub fn with_identity_hash_seed(mut self, seed: u32) -> Self {
        self.identity_hash_seed = seed;
        self
    }

    /// Builder-style snippet warm-up toggle
    pub fn with_warm_snippets(mut self, warm: bool) -> Self {
        self.warm_snippets = warm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IsolateConfig::default();
        assert_eq!(config.memory_limit, 32 * 1024 * 1024);
        assert!(config.warm_snippets);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = IsolateConfig::default().with_memory_limit(0);
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

        let config = IsolateConfig { max_stack_size: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = IsolateConfig { gc_threshold: Some(0), ..Default::default() };
        assert!(config.validate().is_err());
    }
}
