//! Configuration types for Preservo
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for Preservo
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog configuration
    pub catalog: CatalogConfig,
    /// Allocation policy configuration
    pub allocation: AllocationConfig,
}

/// Catalog storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path of the catalog database file
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/preservo/catalog.redb"),
        }
    }
}

/// Partition allocation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Byte ceiling for newly created partitions (default: 1 TB)
    pub default_partition_max_size: u64,
    /// Object count ceiling for newly created partitions
    pub default_partition_max_objects: u64,
    /// How many times alias minting is retried after a uniqueness conflict
    pub alias_retry_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_partition_max_size: 1024 * 1024 * 1024 * 1024, // 1 TB
            default_partition_max_objects: 1_000_000,
            alias_retry_attempts: 3,
        }
    }
}

impl AllocationConfig {
    /// Reject settings the allocator cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.default_partition_max_size == 0 {
            return Err(crate::Error::Configuration(
                "default_partition_max_size must be positive".into(),
            ));
        }
        if self.default_partition_max_objects == 0 {
            return Err(crate::Error::Configuration(
                "default_partition_max_objects must be positive".into(),
            ));
        }
        if self.alias_retry_attempts == 0 {
            return Err(crate::Error::Configuration(
                "alias_retry_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
