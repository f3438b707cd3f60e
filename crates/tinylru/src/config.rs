//! Cache configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Capacity used when a config omits it
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Construction parameters for an LRU cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub capacity: usize,
}

impl CacheConfig {
    /// Create a config with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Parse and validate a JSON config such as `{"capacity": 128}`
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the config can build a cache
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
