//! Configuration structures for ashdb.

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::{AshError, Result};

/// Smallest memory ceiling `auto_sized` will pick (1 MB).
const MIN_AUTO_MEMORY: u64 = 1024 * 1024;

/// Node heap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Number of hash buckets in the node index.
    pub hash_buckets: usize,
    /// Memory ceiling in bytes above which `flush` evicts.
    pub max_memory: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            hash_buckets: 16_384,
            max_memory: 32 * 1024 * 1024, // 32 MB
        }
    }
}

impl HeapConfig {
    /// Creates a heap config sized to 5% of available system RAM.
    ///
    /// Never goes below 1 MB so that tiny containers still cache a useful
    /// working set.
    pub fn auto_sized() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let target = sys.available_memory() / 20;
        Self {
            max_memory: target.max(MIN_AUTO_MEMORY),
            ..Default::default()
        }
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.hash_buckets == 0 {
            return Err(AshError::ConfigError(
                "hash_buckets must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shape of the trees a transaction builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of children per branch.
    pub max_branch_children: usize,
    /// Maximum leaf payload in bytes.
    pub max_leaf_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_branch_children: 24,
            max_leaf_size: 6_134,
        }
    }
}

impl TreeConfig {
    /// Checks that the tree shape is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_branch_children < 3 {
            return Err(AshError::InvalidParameter {
                name: "max_branch_children".to_string(),
                value: self.max_branch_children.to_string(),
            });
        }
        if self.max_leaf_size < 16 {
            return Err(AshError::InvalidParameter {
                name: "max_leaf_size".to_string(),
                value: self.max_leaf_size.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_config_defaults() {
        let config = HeapConfig::default();
        assert_eq!(config.hash_buckets, 16_384);
        assert_eq!(config.max_memory, 32 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heap_config_zero_buckets() {
        let config = HeapConfig {
            hash_buckets: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AshError::ConfigError(_))));
    }

    #[test]
    fn test_heap_config_auto_sized() {
        let config = HeapConfig::auto_sized();
        assert!(config.max_memory >= MIN_AUTO_MEMORY);
        assert_eq!(config.hash_buckets, HeapConfig::default().hash_buckets);
    }

    #[test]
    fn test_heap_config_serde_roundtrip() {
        let original = HeapConfig {
            hash_buckets: 97,
            max_memory: 1000,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: HeapConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.hash_buckets, deserialized.hash_buckets);
        assert_eq!(original.max_memory, deserialized.max_memory);
    }

    #[test]
    fn test_tree_config_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.max_branch_children, 24);
        assert_eq!(config.max_leaf_size, 6_134);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tree_config_rejects_small_shapes() {
        let config = TreeConfig {
            max_branch_children: 2,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameter: max_branch_children = 2");

        let config = TreeConfig {
            max_leaf_size: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tree_config_serde_roundtrip() {
        let original = TreeConfig::default();
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: TreeConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original.max_branch_children, deserialized.max_branch_children);
        assert_eq!(original.max_leaf_size, deserialized.max_leaf_size);
    }
}
