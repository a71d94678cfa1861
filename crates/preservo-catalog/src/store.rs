//! Persistent catalog backed by redb.
//!
//! Every mutation runs in a single write transaction. redb serializes write
//! transactions, so the alias uniqueness check in [`RedbCatalog::create_partition`]
//! and the capacity check in [`RedbCatalog::record_copy`] cannot be raced by
//! another writer on the same database.

use crate::tables;
use preservo_common::{
    Error, LocationId, NewPartition, PartitionId, Result, StorageLocation, StoragePartition,
    TenantId,
};
use preservo_placement::{LocationCatalog, PartitionCatalog};
use redb::{Database, ReadableTable, WriteTransaction};
use std::path::Path;
use tracing::{debug, info};

/// Error type for catalog store operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dangling index entry: {0}")]
    Dangling(String),

    // Rejections that map onto domain errors
    #[error("alias already taken: {0}")]
    AliasTaken(String),
    #[error("partition not found: {0}")]
    PartitionMissing(String),
    #[error("partition {location} cannot take {size} more bytes")]
    Full { location: String, size: u64 },
}

impl From<redb::TransactionError> for CatalogStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl CatalogStoreError {
    /// Convert into the common error, annotating backend failures
    fn into_error(self, operation: &'static str, target: impl ToString) -> Error {
        match self {
            Self::AliasTaken(alias) => Error::AliasConflict { alias },
            Self::PartitionMissing(id) => Error::PartitionNotFound(id),
            Self::Full { location, size } => Error::NoCapacityAvailable { location, size },
            other => Error::catalog(operation, target, other),
        }
    }
}

pub type CatalogStoreResult<T> = std::result::Result<T, CatalogStoreError>;

/// Persistent catalog of storage locations and partitions.
pub struct RedbCatalog {
    db: Database,
}

impl RedbCatalog {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::open_inner(path).map_err(|e| e.into_error("open", path.display()))
    }

    fn open_inner(path: &Path) -> CatalogStoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::LOCATIONS)?;
            let _t = write_txn.open_table(tables::LOCATION_KEYS)?;
            let _t = write_txn.open_table(tables::PARTITIONS)?;
            let _t = write_txn.open_table(tables::PARTITION_KEYS)?;
            let _t = write_txn.open_table(tables::PARTITION_ALIASES)?;
            let _t = write_txn.open_table(tables::SEQUENCES)?;
        }
        write_txn.commit()?;

        info!("Opened catalog at {}", path.display());
        Ok(Self { db })
    }

    // ---- Locations ----

    /// Add a storage location, or replace it in place keeping its catalog position
    pub fn put_location(&self, location: &StorageLocation) -> Result<()> {
        self.put_location_inner(location)
            .map_err(|e| e.into_error("put_location", &location.id))
    }

    fn put_location_inner(&self, location: &StorageLocation) -> CatalogStoreResult<()> {
        let bytes = bincode::serialize(location)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut keys = write_txn.open_table(tables::LOCATION_KEYS)?;
            let mut rows = write_txn.open_table(tables::LOCATIONS)?;

            let existing = keys
                .get(location.id.as_str())?
                .map(|k| k.value().to_string());
            let key = match existing {
                // A tenant change moves the row to the end of the new tenant's list.
                Some(key) if key.starts_with(&tables::owner_range(location.tenant.as_str()).0) => {
                    key
                }
                Some(stale) => {
                    rows.remove(stale.as_str())?;
                    let seq = next_seq(&write_txn, tables::LOCATION_SEQ)?;
                    tables::row_key(location.tenant.as_str(), seq)
                }
                None => {
                    let seq = next_seq(&write_txn, tables::LOCATION_SEQ)?;
                    tables::row_key(location.tenant.as_str(), seq)
                }
            };

            rows.insert(key.as_str(), bytes.as_slice())?;
            keys.insert(location.id.as_str(), key.as_str())?;
        }
        write_txn.commit()?;
        debug!("Stored location '{}'", location.id);
        Ok(())
    }

    /// Look up a storage location by id
    pub fn get_location(&self, id: &LocationId) -> Result<Option<StorageLocation>> {
        self.get_location_inner(id)
            .map_err(|e| e.into_error("get_location", id))
    }

    /// Look up a storage location that must be registered
    pub fn require_location(&self, id: &LocationId) -> Result<StorageLocation> {
        self.get_location(id)?
            .ok_or_else(|| Error::LocationNotFound(id.to_string()))
    }

    fn get_location_inner(&self, id: &LocationId) -> CatalogStoreResult<Option<StorageLocation>> {
        let read_txn = self.db.begin_read()?;
        let keys = read_txn.open_table(tables::LOCATION_KEYS)?;
        let Some(key) = keys.get(id.as_str())? else {
            return Ok(None);
        };
        let rows = read_txn.open_table(tables::LOCATIONS)?;
        let row = rows
            .get(key.value())?
            .ok_or_else(|| CatalogStoreError::Dangling(key.value().to_string()))?;
        Ok(Some(bincode::deserialize(row.value())?))
    }

    fn list_locations_inner(&self, tenant: &TenantId) -> CatalogStoreResult<Vec<StorageLocation>> {
        let read_txn = self.db.begin_read()?;
        let rows = read_txn.open_table(tables::LOCATIONS)?;
        let (start, end) = tables::owner_range(tenant.as_str());
        let mut result: Vec<StorageLocation> = Vec::new();
        for entry in rows.range(start.as_str()..end.as_str())? {
            let entry = entry?;
            result.push(bincode::deserialize(entry.1.value())?);
        }
        Ok(result)
    }

    // ---- Partitions ----

    /// Look up a partition by identity
    pub fn get_partition(&self, id: PartitionId) -> Result<Option<StoragePartition>> {
        self.get_partition_inner(id)
            .map_err(|e| e.into_error("get_partition", id))
    }

    fn get_partition_inner(&self, id: PartitionId) -> CatalogStoreResult<Option<StoragePartition>> {
        let read_txn = self.db.begin_read()?;
        let keys = read_txn.open_table(tables::PARTITION_KEYS)?;
        let Some(key) = keys.get(id.to_string().as_str())? else {
            return Ok(None);
        };
        let rows = read_txn.open_table(tables::PARTITIONS)?;
        let row = rows
            .get(key.value())?
            .ok_or_else(|| CatalogStoreError::Dangling(key.value().to_string()))?;
        Ok(Some(bincode::deserialize(row.value())?))
    }

    fn list_partitions_inner(
        &self,
        location: &LocationId,
    ) -> CatalogStoreResult<Vec<StoragePartition>> {
        let read_txn = self.db.begin_read()?;
        let rows = read_txn.open_table(tables::PARTITIONS)?;
        let (start, end) = tables::owner_range(location.as_str());
        let mut result: Vec<StoragePartition> = Vec::new();
        for entry in rows.range(start.as_str()..end.as_str())? {
            let entry = entry?;
            result.push(bincode::deserialize(entry.1.value())?);
        }
        Ok(result)
    }

    fn create_partition_inner(
        &self,
        partition: NewPartition,
    ) -> CatalogStoreResult<StoragePartition> {
        let write_txn = self.db.begin_write()?;
        match insert_partition(&write_txn, partition) {
            Ok(created) => {
                write_txn.commit()?;
                Ok(created)
            }
            Err(e) => {
                write_txn.abort()?;
                Err(e)
            }
        }
    }

    /// Account for a stored copy of `object_size` bytes.
    ///
    /// Capacity is re-checked inside the write transaction; a partition that
    /// filled up since the allocator read it is rejected with
    /// [`Error::NoCapacityAvailable`].
    pub fn record_copy(&self, id: PartitionId, object_size: u64) -> Result<StoragePartition> {
        self.record_copy_inner(id, object_size)
            .map_err(|e| e.into_error("record_copy", id))
    }

    fn record_copy_inner(
        &self,
        id: PartitionId,
        object_size: u64,
    ) -> CatalogStoreResult<StoragePartition> {
        let write_txn = self.db.begin_write()?;
        let updated = match apply_copy(&write_txn, id, object_size) {
            Ok(updated) => updated,
            Err(e) => {
                write_txn.abort()?;
                return Err(e);
            }
        };
        write_txn.commit()?;
        debug!(
            "Recorded {} bytes in partition '{}' ({}/{} bytes, {}/{} objects)",
            object_size,
            updated.alias,
            updated.current_size,
            updated.max_size,
            updated.current_objects,
            updated.max_objects
        );
        Ok(updated)
    }
}

impl LocationCatalog for RedbCatalog {
    fn list_storage_locations(&self, tenant: &TenantId) -> Result<Vec<StorageLocation>> {
        self.list_locations_inner(tenant)
            .map_err(|e| e.into_error("list_storage_locations", tenant))
    }
}

impl PartitionCatalog for RedbCatalog {
    fn list_partitions(&self, location: &LocationId) -> Result<Vec<StoragePartition>> {
        self.list_partitions_inner(location)
            .map_err(|e| e.into_error("list_partitions", location))
    }

    fn create_partition(&self, partition: NewPartition) -> Result<StoragePartition> {
        let target = partition.alias.clone();
        self.create_partition_inner(partition)
            .map_err(|e| e.into_error("create_partition", target))
    }
}

/// Issue the next number of a named sequence within `write_txn`
fn next_seq(write_txn: &WriteTransaction, name: &str) -> CatalogStoreResult<u64> {
    let mut table = write_txn.open_table(tables::SEQUENCES)?;
    let next = table.get(name)?.map_or(0, |v| v.value()) + 1;
    table.insert(name, next)?;
    Ok(next)
}

/// Insert a partition unless its alias is already taken in the location
fn insert_partition(
    write_txn: &WriteTransaction,
    partition: NewPartition,
) -> CatalogStoreResult<StoragePartition> {
    let location = partition.storage_location_id.as_str().to_string();
    let alias_key = tables::alias_key(&location, &partition.alias);

    let mut aliases = write_txn.open_table(tables::PARTITION_ALIASES)?;
    if aliases.get(alias_key.as_str())?.is_some() {
        return Err(CatalogStoreError::AliasTaken(partition.alias));
    }

    let key = tables::row_key(&location, next_seq(write_txn, tables::PARTITION_SEQ)?);
    let created = partition.into_partition(PartitionId::new());
    let id = created.id.to_string();
    let bytes = bincode::serialize(&created)?;

    let mut rows = write_txn.open_table(tables::PARTITIONS)?;
    rows.insert(key.as_str(), bytes.as_slice())?;
    let mut keys = write_txn.open_table(tables::PARTITION_KEYS)?;
    keys.insert(id.as_str(), key.as_str())?;
    aliases.insert(alias_key.as_str(), id.as_str())?;
    Ok(created)
}

/// Add one object of `object_size` bytes to a partition's occupancy
fn apply_copy(
    write_txn: &WriteTransaction,
    id: PartitionId,
    object_size: u64,
) -> CatalogStoreResult<StoragePartition> {
    let keys = write_txn.open_table(tables::PARTITION_KEYS)?;
    let key = keys
        .get(id.to_string().as_str())?
        .map(|k| k.value().to_string())
        .ok_or_else(|| CatalogStoreError::PartitionMissing(id.to_string()))?;

    let mut rows = write_txn.open_table(tables::PARTITIONS)?;
    let mut partition: StoragePartition = {
        let row = rows
            .get(key.as_str())?
            .ok_or_else(|| CatalogStoreError::Dangling(key.clone()))?;
        bincode::deserialize(row.value())?
    };

    if !partition.has_room_for(object_size) {
        return Err(CatalogStoreError::Full {
            location: partition.storage_location_id.to_string(),
            size: object_size,
        });
    }
    partition.current_size += object_size;
    partition.current_objects += 1;

    let bytes = bincode::serialize(&partition)?;
    rows.insert(key.as_str(), bytes.as_slice())?;
    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use preservo_common::{AllocationConfig, PartitionTemplate};
    use preservo_placement::{PartitionAllocator, PlacementPlanner};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn open(dir: &Path) -> RedbCatalog {
        RedbCatalog::open(dir.join("catalog.redb")).unwrap()
    }

    #[test]
    fn test_locations_per_tenant_in_order() {
        let dir = tempdir().unwrap();
        let catalog = open(dir.path());

        for (id, tenant) in [("z", "t1"), ("a", "t2"), ("m", "t1"), ("b", "t1")] {
            catalog.put_location(&StorageLocation::new(id, tenant, 1, 1)).unwrap();
        }

        let ids: Vec<_> = catalog
            .list_storage_locations(&TenantId::new("t1"))
            .unwrap()
            .into_iter()
            .map(|l| l.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["z", "m", "b"]);
    }

    #[test]
    fn test_put_location_updates_in_place() {
        let dir = tempdir().unwrap();
        let catalog = open(dir.path());
        catalog.put_location(&StorageLocation::new("a", "t1", 1, 1)).unwrap();
        catalog.put_location(&StorageLocation::new("b", "t1", 1, 1)).unwrap();
        catalog.put_location(&StorageLocation::new("a", "t1", 9, 3)).unwrap();

        let locations = catalog.list_storage_locations(&TenantId::new("t1")).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].id, LocationId::new("a"));
        assert_eq!(locations[0].quality, 9);

        catalog.put_location(&StorageLocation::new("a", "t2", 9, 3)).unwrap();
        assert_eq!(catalog.list_storage_locations(&TenantId::new("t1")).unwrap().len(), 1);
        assert_eq!(
            catalog.get_location(&LocationId::new("a")).unwrap().unwrap().tenant,
            TenantId::new("t2")
        );
    }

    #[test]
    fn test_require_location() {
        let dir = tempdir().unwrap();
        let catalog = open(dir.path());
        catalog.put_location(&StorageLocation::new("a", "t1", 4, 2)).unwrap();

        assert_eq!(catalog.require_location(&LocationId::new("a")).unwrap().quality, 4);
        let err = catalog.require_location(&LocationId::new("missing")).unwrap_err();
        assert!(matches!(err, Error::LocationNotFound(ref id) if id == "missing"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_create_and_list_partitions() {
        let dir = tempdir().unwrap();
        let catalog = open(dir.path());
        let template = PartitionTemplate::new("L", 100, 10);

        let first = catalog.create_partition(template.with_alias("L-partition-1")).unwrap();
        let second = catalog.create_partition(template.with_alias("L-partition-2")).unwrap();
        catalog
            .create_partition(PartitionTemplate::new("L2", 100, 10).with_alias("L2-partition-1"))
            .unwrap();

        let listed = catalog.list_partitions(&LocationId::new("L")).unwrap();
        assert_eq!(listed, vec![first.clone(), second]);
        assert_eq!(catalog.get_partition(first.id).unwrap(), Some(first));
        assert_eq!(catalog.get_partition(PartitionId::new()).unwrap(), None);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let dir = tempdir().unwrap();
        let catalog = open(dir.path());
        let template = PartitionTemplate::new("L", 100, 10);

        catalog.create_partition(template.with_alias("L-partition-1")).unwrap();
        let err = catalog
            .create_partition(template.with_alias("L-partition-1"))
            .unwrap_err();
        assert!(matches!(err, Error::AliasConflict { ref alias } if alias == "L-partition-1"));
        assert_eq!(catalog.list_partitions(&LocationId::new("L")).unwrap().len(), 1);
    }

    #[test]
    fn test_record_copy_revalidates_capacity() {
        let dir = tempdir().unwrap();
        let catalog = open(dir.path());
        let partition = catalog
            .create_partition(PartitionTemplate::new("L", 100, 10).with_alias("L-partition-1"))
            .unwrap();

        let updated = catalog.record_copy(partition.id, 70).unwrap();
        assert_eq!(updated.current_size, 70);
        assert_eq!(updated.current_objects, 1);

        let err = catalog.record_copy(partition.id, 31).unwrap_err();
        assert!(err.is_capacity_exhausted());
        assert_eq!(catalog.get_partition(partition.id).unwrap().unwrap().current_size, 70);

        let err = catalog.record_copy(PartitionId::new(), 1).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let catalog = open(dir.path());
            catalog.put_location(&StorageLocation::new("L", "t1", 5, 5)).unwrap();
            catalog
                .create_partition(PartitionTemplate::new("L", 100, 10).with_alias("L-partition-1"))
                .unwrap()
                .id
        };

        let catalog = open(dir.path());
        assert_eq!(catalog.list_storage_locations(&TenantId::new("t1")).unwrap().len(), 1);
        assert_eq!(catalog.get_partition(id).unwrap().unwrap().alias, "L-partition-1");
    }

    #[test]
    fn test_allocator_over_redb() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(open(dir.path()));
        let allocator = PartitionAllocator::new(Arc::clone(&catalog));
        let location = LocationId::new("L");
        let template = PartitionTemplate::new("L", 1_000_000, 100);

        let first = allocator.allocate(&location, 600_000, &template).unwrap();
        assert!(first.created);
        assert_eq!(first.partition.alias, "L-partition-1");
        catalog.record_copy(first.partition.id, 600_000).unwrap();

        let second = allocator.allocate(&location, 600_000, &template).unwrap();
        assert!(second.created);
        assert_eq!(second.partition.alias, "L-partition-2");
        catalog.record_copy(second.partition.id, 600_000).unwrap();

        // Both have 400_000 free; the earlier one wins the tie.
        let third = allocator.allocate(&location, 300_000, &template).unwrap();
        assert!(!third.created);
        assert_eq!(third.partition.id, first.partition.id);
    }

    #[test]
    fn test_planner_over_redb() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(open(dir.path()));
        for (id, quality, price) in [
            ("a", 34, 99),
            ("b", 22, 67),
            ("c", 10, 40),
            ("d", 27, 56),
            ("e", 68, 200),
        ] {
            catalog
                .put_location(&StorageLocation::new(id, "tenant", quality, price))
                .unwrap();
        }

        let planner = PlacementPlanner::new(Arc::clone(&catalog), AllocationConfig::default());
        let plan = planner.plan(&TenantId::new("tenant"), 66, 1_024).unwrap();
        assert_eq!(plan.assignments.len(), 3);
        assert!(plan.quality >= 66);
        assert_eq!(plan.price, 195);

        for assignment in &plan.assignments {
            let stored = catalog.list_partitions(&assignment.location.id).unwrap();
            assert_eq!(stored, vec![assignment.allocation.partition.clone()]);
        }
    }
}
