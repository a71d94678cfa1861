//! Core type definitions for Preservo
//!
//! This module defines the identifiers and catalog records shared by the
//! allocation engine and its catalog collaborators.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a tenant owning storage locations
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the tenant identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({:?})", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a storage location.
///
/// The textual form is externally visible: it prefixes every partition alias
/// minted for the location.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct LocationId(String);

impl LocationId {
    /// Create a new location identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the location identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationId({:?})", self.0)
    }
}

impl From<&str> for LocationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque identity of a storage partition, assigned by the catalog
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct PartitionId(Uuid);

impl PartitionId {
    /// Generate a new random partition ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PartitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionId({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PartitionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A backend destination (vault, repository) a tenant can replicate into
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Location identifier
    pub id: LocationId,
    /// Owning tenant
    pub tenant: TenantId,
    /// Durability/compliance rating contributed by a copy here
    pub quality: u32,
    /// Cost of placing a copy here, in abstract units
    pub price: u64,
}

impl StorageLocation {
    /// Create a new storage location
    #[must_use]
    pub fn new(
        id: impl Into<LocationId>,
        tenant: impl Into<TenantId>,
        quality: u32,
        price: u64,
    ) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            quality,
            price,
        }
    }
}

/// A capacity-bounded bucket within a storage location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePartition {
    /// Partition identity
    pub id: PartitionId,
    /// Owning storage location
    pub storage_location_id: LocationId,
    /// Human-readable name, `<location>-partition-<n>`
    pub alias: String,
    /// Byte ceiling
    pub max_size: u64,
    /// Object count ceiling
    pub max_objects: u64,
    /// Bytes currently stored
    pub current_size: u64,
    /// Objects currently stored
    pub current_objects: u64,
}

impl StoragePartition {
    /// Check whether an object of `size` bytes fits without breaking either ceiling
    #[must_use]
    pub fn has_room_for(&self, size: u64) -> bool {
        self.current_objects < self.max_objects
            && self
                .current_size
                .checked_add(size)
                .is_some_and(|total| total <= self.max_size)
    }
}

/// Capacity ceilings for a partition that does not exist yet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTemplate {
    /// Location the partition will belong to
    pub storage_location_id: LocationId,
    /// Byte ceiling
    pub max_size: u64,
    /// Object count ceiling
    pub max_objects: u64,
}

impl PartitionTemplate {
    /// Create a new template
    #[must_use]
    pub fn new(
        storage_location_id: impl Into<LocationId>,
        max_size: u64,
        max_objects: u64,
    ) -> Self {
        Self {
            storage_location_id: storage_location_id.into(),
            max_size,
            max_objects,
        }
    }

    /// Whether a fresh partition built from this template could hold `size` bytes
    #[must_use]
    pub fn can_hold(&self, size: u64) -> bool {
        self.max_objects > 0 && size <= self.max_size
    }

    /// Attach an alias, producing the record handed to the catalog
    #[must_use]
    pub fn with_alias(&self, alias: impl Into<String>) -> NewPartition {
        NewPartition {
            storage_location_id: self.storage_location_id.clone(),
            alias: alias.into(),
            max_size: self.max_size,
            max_objects: self.max_objects,
        }
    }
}

/// A partition about to be persisted; the catalog assigns its identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPartition {
    /// Owning storage location
    pub storage_location_id: LocationId,
    /// Minted alias
    pub alias: String,
    /// Byte ceiling
    pub max_size: u64,
    /// Object count ceiling
    pub max_objects: u64,
}

impl NewPartition {
    /// Turn into an empty partition with the given identity
    #[must_use]
    pub fn into_partition(self, id: PartitionId) -> StoragePartition {
        StoragePartition {
            id,
            storage_location_id: self.storage_location_id,
            alias: self.alias,
            max_size: self.max_size,
            max_objects: self.max_objects,
            current_size: 0,
            current_objects: 0,
        }
    }
}
