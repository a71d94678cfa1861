//! Catalog collaborators consumed by the allocation engine
//!
//! The engine never owns mutable state: partition occupancy and alias
//! sequences live behind these traits.

use parking_lot::RwLock;
use preservo_common::{
    Error, LocationId, NewPartition, PartitionId, Result, StorageLocation, StoragePartition,
    TenantId,
};

/// Source of storage locations per tenant
pub trait LocationCatalog: Send + Sync {
    /// List the tenant's storage locations in catalog order
    fn list_storage_locations(&self, tenant: &TenantId) -> Result<Vec<StorageLocation>>;
}

/// Source and sink of storage partitions per location.
///
/// Implementations must reject a `create_partition` whose alias already
/// exists in the location with [`Error::AliasConflict`]. The allocator
/// serializes minting within one process; the uniqueness check is what keeps
/// several processes from handing out the same alias.
pub trait PartitionCatalog: Send + Sync {
    /// List the location's partitions in catalog order
    fn list_partitions(&self, location: &LocationId) -> Result<Vec<StoragePartition>>;

    /// Persist a new partition, assigning its identity
    fn create_partition(&self, partition: NewPartition) -> Result<StoragePartition>;
}

#[derive(Default)]
struct MemoryState {
    locations: Vec<StorageLocation>,
    partitions: Vec<StoragePartition>,
}

/// In-memory catalog keeping insertion order
#[derive(Default)]
pub struct MemoryCatalog {
    state: RwLock<MemoryState>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a storage location
    pub fn put_location(&self, location: StorageLocation) {
        let mut state = self.state.write();
        match state.locations.iter_mut().find(|l| l.id == location.id) {
            Some(existing) => *existing = location,
            None => state.locations.push(location),
        }
    }

    /// Insert a partition as-is, bypassing alias checks
    pub fn insert_partition(&self, partition: StoragePartition) {
        self.state.write().partitions.push(partition);
    }

    /// Look up a partition by identity
    #[must_use]
    pub fn get_partition(&self, id: PartitionId) -> Option<StoragePartition> {
        self.state.read().partitions.iter().find(|p| p.id == id).cloned()
    }

    /// Account for a stored copy, re-validating capacity under the write lock
    pub fn record_copy(&self, id: PartitionId, object_size: u64) -> Result<StoragePartition> {
        let mut state = self.state.write();
        let partition = state
            .partitions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::PartitionNotFound(id.to_string()))?;

        if !partition.has_room_for(object_size) {
            return Err(Error::no_capacity(&partition.storage_location_id, object_size));
        }
        partition.current_size += object_size;
        partition.current_objects += 1;
        Ok(partition.clone())
    }
}

impl LocationCatalog for MemoryCatalog {
    fn list_storage_locations(&self, tenant: &TenantId) -> Result<Vec<StorageLocation>> {
        Ok(self
            .state
            .read()
            .locations
            .iter()
            .filter(|l| &l.tenant == tenant)
            .cloned()
            .collect())
    }
}

impl PartitionCatalog for MemoryCatalog {
    fn list_partitions(&self, location: &LocationId) -> Result<Vec<StoragePartition>> {
        Ok(self
            .state
            .read()
            .partitions
            .iter()
            .filter(|p| &p.storage_location_id == location)
            .cloned()
            .collect())
    }

    fn create_partition(&self, partition: NewPartition) -> Result<StoragePartition> {
        let mut state = self.state.write();
        let taken = state.partitions.iter().any(|p| {
            p.storage_location_id == partition.storage_location_id && p.alias == partition.alias
        });
        if taken {
            return Err(Error::AliasConflict {
                alias: partition.alias,
            });
        }

        let created = partition.into_partition(PartitionId::new());
        state.partitions.push(created.clone());
        Ok(created)
    }
}
