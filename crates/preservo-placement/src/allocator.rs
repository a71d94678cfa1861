//! Partition assignment within a storage location
//!
//! Existing partitions are filled first: the fullest partition that still
//! has room for the object wins. When none has room, a new partition is
//! created under the next free alias of the location.

use crate::alias;
use crate::catalog::PartitionCatalog;
use crate::locks::LocationLocks;
use preservo_common::{
    AllocationConfig, Error, LocationId, PartitionTemplate, Result, StoragePartition,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Partition chosen for an object
#[derive(Clone, Debug, Serialize)]
pub struct Allocation {
    /// Target partition, occupancy as read from the catalog
    pub partition: StoragePartition,
    /// Whether the partition was created for this allocation
    pub created: bool,
}

/// Pick the fullest partition that can still take `object_size` bytes and one
/// more object.
///
/// Ties on current size go to the earliest partition in `partitions`.
#[must_use]
pub fn select_partition(
    partitions: &[StoragePartition],
    object_size: u64,
) -> Option<&StoragePartition> {
    let mut best: Option<&StoragePartition> = None;
    for partition in partitions.iter().filter(|p| p.has_room_for(object_size)) {
        if best.is_none_or(|b| partition.current_size > b.current_size) {
            best = Some(partition);
        }
    }
    best
}

/// Finds or creates partitions in a location's catalog
pub struct PartitionAllocator<C> {
    catalog: Arc<C>,
    locks: Arc<LocationLocks>,
    alias_retry_attempts: u32,
}

impl<C: PartitionCatalog> PartitionAllocator<C> {
    /// Create an allocator with default settings
    #[must_use]
    pub fn new(catalog: Arc<C>) -> Self {
        Self::with_config(catalog, &AllocationConfig::default())
    }

    /// Create an allocator from configuration
    #[must_use]
    pub fn with_config(catalog: Arc<C>, config: &AllocationConfig) -> Self {
        Self {
            catalog,
            locks: Arc::new(LocationLocks::new()),
            alias_retry_attempts: config.alias_retry_attempts.max(1),
        }
    }

    /// Share a lock table with other allocators in the same process
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<LocationLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// The underlying catalog
    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    /// Find an existing partition of `location` able to hold `object_size` bytes.
    ///
    /// The returned partition is not modified; the caller updates its
    /// occupancy once the copy is stored, and must re-validate capacity then
    /// since this is a snapshot read.
    pub fn find_partition_for_size(
        &self,
        location: &LocationId,
        object_size: u64,
    ) -> Result<StoragePartition> {
        let partitions = self.catalog.list_partitions(location)?;
        match select_partition(&partitions, object_size) {
            Some(partition) => {
                debug!(
                    location = %location,
                    alias = %partition.alias,
                    current_size = partition.current_size,
                    object_size,
                    "selected partition"
                );
                Ok(partition.clone())
            }
            None => {
                debug!(
                    location = %location,
                    partitions = partitions.len(),
                    object_size,
                    "no partition has room"
                );
                Err(Error::no_capacity(location, object_size))
            }
        }
    }

    /// Create a partition of `location` under the next free alias.
    ///
    /// Minting runs under the location's lock. A catalog-side alias conflict
    /// (another process minted the same alias) triggers a fresh read and a new
    /// alias, up to the configured number of attempts. Any other catalog error
    /// is returned as is.
    pub fn create_partition_with_alias(
        &self,
        location: &LocationId,
        template: &PartitionTemplate,
    ) -> Result<StoragePartition> {
        if &template.storage_location_id != location {
            return Err(Error::invalid_argument(format!(
                "template belongs to location {}, not {location}",
                template.storage_location_id
            )));
        }

        self.locks.with_lock(location, || {
            for attempt in 1..=self.alias_retry_attempts {
                let existing = self.catalog.list_partitions(location)?;
                let alias = alias::next_alias(location, &existing)?;

                match self.catalog.create_partition(template.with_alias(alias)) {
                    Ok(partition) => {
                        info!(
                            location = %location,
                            alias = %partition.alias,
                            id = %partition.id,
                            max_size = partition.max_size,
                            max_objects = partition.max_objects,
                            "created partition"
                        );
                        return Ok(partition);
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(location = %location, error = %e, attempt, "alias taken, re-minting");
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(Error::AliasExhausted {
                location: location.to_string(),
                attempts: self.alias_retry_attempts,
            })
        })
    }

    /// Find a partition with room for the object, creating one from `template`
    /// if none has any
    pub fn allocate(
        &self,
        location: &LocationId,
        object_size: u64,
        template: &PartitionTemplate,
    ) -> Result<Allocation> {
        match self.find_partition_for_size(location, object_size) {
            Ok(partition) => Ok(Allocation {
                partition,
                created: false,
            }),
            Err(e) if e.is_capacity_exhausted() => {
                if !template.can_hold(object_size) {
                    return Err(Error::ObjectTooLarge {
                        location: location.to_string(),
                        size: object_size,
                        max_size: template.max_size,
                    });
                }
                let partition = self.create_partition_with_alias(location, template)?;
                Ok(Allocation {
                    partition,
                    created: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use parking_lot::Mutex;
    use preservo_common::{NewPartition, PartitionId};
    use std::thread;

    fn partition(
        location: &str,
        alias: &str,
        current_size: u64,
        max_size: u64,
        current_objects: u64,
        max_objects: u64,
    ) -> StoragePartition {
        StoragePartition {
            id: PartitionId::new(),
            storage_location_id: LocationId::new(location),
            alias: alias.to_string(),
            max_size,
            max_objects,
            current_size,
            current_objects,
        }
    }

    fn template(max_size: u64, max_objects: u64) -> PartitionTemplate {
        PartitionTemplate::new("L", max_size, max_objects)
    }

    /// The four-partition catalog used throughout these tests
    fn reference_catalog() -> (Arc<MemoryCatalog>, Vec<StoragePartition>) {
        let partitions = vec![
            partition("L", "L-partition-1", 950_000, 1_000_000, 23, 100),
            partition("L", "L-partition-2", 96_000, 1_000_000, 100, 100),
            partition("L", "L-partition-3", 150_000, 1_000_000, 23, 100),
            partition("L", "L-partition-4", 140_000, 1_000_000, 23, 100),
        ];
        let catalog = Arc::new(MemoryCatalog::new());
        for p in &partitions {
            catalog.insert_partition(p.clone());
        }
        (catalog, partitions)
    }

    #[test]
    fn test_find_prefers_fullest_with_room() {
        let (catalog, partitions) = reference_catalog();
        let allocator = PartitionAllocator::new(catalog);

        let found = allocator
            .find_partition_for_size(&LocationId::new("L"), 100_000)
            .unwrap();
        assert_eq!(found.id, partitions[2].id);
        assert_eq!(found, partitions[2]);
    }

    #[test]
    fn test_find_no_capacity() {
        let (catalog, _) = reference_catalog();
        let allocator = PartitionAllocator::new(catalog);

        let err = allocator
            .find_partition_for_size(&LocationId::new("L"), 950_000)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NoCapacityAvailable { ref location, size: 950_000 } if location == "L"
        ));
    }

    #[test]
    fn test_find_in_empty_location() {
        let allocator = PartitionAllocator::new(Arc::new(MemoryCatalog::new()));
        let err = allocator
            .find_partition_for_size(&LocationId::new("L"), 0)
            .unwrap_err();
        assert!(err.is_capacity_exhausted());
    }

    #[test]
    fn test_select_ties_go_to_first() {
        let partitions = vec![
            partition("L", "L-partition-1", 10, 100, 0, 5),
            partition("L", "L-partition-2", 10, 100, 0, 5),
        ];
        let chosen = select_partition(&partitions, 5).unwrap();
        assert_eq!(chosen.alias, "L-partition-1");
    }

    #[test]
    fn test_select_exact_fit() {
        let partitions = vec![partition("L", "L-partition-1", 60, 100, 4, 5)];
        assert!(select_partition(&partitions, 40).is_some());
        assert!(select_partition(&partitions, 41).is_none());
    }

    #[test]
    fn test_create_after_gap() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert_partition(partition("L", "L-partition-1", 0, 10, 0, 1));
        catalog.insert_partition(partition("L", "L-partition-3", 0, 10, 0, 1));
        let allocator = PartitionAllocator::new(Arc::clone(&catalog));

        let created = allocator
            .create_partition_with_alias(&LocationId::new("L"), &template(500, 7))
            .unwrap();
        assert_eq!(created.alias, "L-partition-4");
        assert_eq!(created.max_size, 500);
        assert_eq!(created.max_objects, 7);
        assert_eq!(created.current_size, 0);
        assert_eq!(catalog.get_partition(created.id), Some(created));
    }

    #[test]
    fn test_create_first_partition() {
        let allocator = PartitionAllocator::new(Arc::new(MemoryCatalog::new()));
        let created = allocator
            .create_partition_with_alias(&LocationId::new("L"), &template(500, 7))
            .unwrap();
        assert_eq!(created.alias, "L-partition-1");
    }

    #[test]
    fn test_create_rejects_foreign_template() {
        let allocator = PartitionAllocator::new(Arc::new(MemoryCatalog::new()));
        let err = allocator
            .create_partition_with_alias(
                &LocationId::new("L"),
                &PartitionTemplate::new("M", 500, 7),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_create_surfaces_malformed_alias() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert_partition(partition("L", "L-partition-two", 0, 10, 0, 1));
        let allocator = PartitionAllocator::new(catalog);

        let err = allocator
            .create_partition_with_alias(&LocationId::new("L"), &template(500, 7))
            .unwrap_err();
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_concurrent_creates_get_distinct_aliases() {
        let catalog = Arc::new(MemoryCatalog::new());
        let allocator = Arc::new(PartitionAllocator::new(Arc::clone(&catalog)));
        let location = LocationId::new("L");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                let location = location.clone();
                thread::spawn(move || {
                    allocator
                        .create_partition_with_alias(&location, &template(10, 1))
                        .unwrap()
                        .alias
                })
            })
            .collect();

        let mut aliases: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        aliases.sort();
        aliases.dedup();
        assert_eq!(aliases.len(), 8);
        assert_eq!(catalog.list_partitions(&location).unwrap().len(), 8);
    }

    /// Catalog whose listing lags behind a competing writer for a few calls
    struct RacingCatalog {
        inner: MemoryCatalog,
        stale_reads: Mutex<u32>,
    }

    impl PartitionCatalog for RacingCatalog {
        fn list_partitions(&self, location: &LocationId) -> Result<Vec<StoragePartition>> {
            let mut stale = self.stale_reads.lock();
            if *stale > 0 {
                *stale -= 1;
                // Another process wins the race between our read and insert.
                let next = self.inner.list_partitions(location)?.len() + 1;
                let alias = alias::format_alias(location, next as u64);
                let ours = self.inner.list_partitions(location)?;
                let template = PartitionTemplate::new(location.clone(), 1, 1);
                self.inner.create_partition(template.with_alias(alias))?;
                return Ok(ours);
            }
            self.inner.list_partitions(location)
        }

        fn create_partition(&self, partition: NewPartition) -> Result<StoragePartition> {
            self.inner.create_partition(partition)
        }
    }

    #[test]
    fn test_alias_conflict_retried() {
        let catalog = Arc::new(RacingCatalog {
            inner: MemoryCatalog::new(),
            stale_reads: Mutex::new(2),
        });
        let allocator = PartitionAllocator::new(Arc::clone(&catalog));

        let created = allocator
            .create_partition_with_alias(&LocationId::new("L"), &template(5, 5))
            .unwrap();
        assert_eq!(created.alias, "L-partition-3");
    }

    #[test]
    fn test_alias_conflict_gives_up() {
        let catalog = Arc::new(RacingCatalog {
            inner: MemoryCatalog::new(),
            stale_reads: Mutex::new(10),
        });
        let config = AllocationConfig {
            alias_retry_attempts: 2,
            ..Default::default()
        };
        let allocator = PartitionAllocator::with_config(catalog, &config);

        let err = allocator
            .create_partition_with_alias(&LocationId::new("L"), &template(5, 5))
            .unwrap_err();
        assert!(matches!(err, Error::AliasExhausted { attempts: 2, .. }));
    }

    /// Catalog that fails one operation with a backend error and counts calls
    struct FailingCatalog {
        inner: MemoryCatalog,
        failing: &'static str,
        lists: Mutex<u32>,
        creates: Mutex<u32>,
    }

    impl FailingCatalog {
        fn new(failing: &'static str) -> Self {
            Self {
                inner: MemoryCatalog::new(),
                failing,
                lists: Mutex::new(0),
                creates: Mutex::new(0),
            }
        }
    }

    impl PartitionCatalog for FailingCatalog {
        fn list_partitions(&self, location: &LocationId) -> Result<Vec<StoragePartition>> {
            *self.lists.lock() += 1;
            if self.failing == "list_partitions" {
                return Err(Error::catalog("list_partitions", location, "disk offline"));
            }
            self.inner.list_partitions(location)
        }

        fn create_partition(&self, partition: NewPartition) -> Result<StoragePartition> {
            *self.creates.lock() += 1;
            if self.failing == "create_partition" {
                return Err(Error::catalog("create_partition", partition.alias, "disk offline"));
            }
            self.inner.create_partition(partition)
        }
    }

    #[test]
    fn test_create_catalog_error_not_retried() {
        let catalog = Arc::new(FailingCatalog::new("create_partition"));
        let allocator = PartitionAllocator::new(Arc::clone(&catalog));

        let err = allocator
            .create_partition_with_alias(&LocationId::new("L"), &template(5, 5))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Catalog { operation: "create_partition", ref target, .. }
                if target == "L-partition-1"
        ));
        assert!(!err.is_retryable());
        assert_eq!(*catalog.lists.lock(), 1);
        assert_eq!(*catalog.creates.lock(), 1);
    }

    #[test]
    fn test_allocate_passes_catalog_errors_through() {
        let catalog = Arc::new(FailingCatalog::new("create_partition"));
        let allocator = PartitionAllocator::new(Arc::clone(&catalog));
        let err = allocator
            .allocate(&LocationId::new("L"), 1, &template(5, 5))
            .unwrap_err();
        assert!(matches!(err, Error::Catalog { operation: "create_partition", .. }));
        assert_eq!(*catalog.creates.lock(), 1);

        let catalog = Arc::new(FailingCatalog::new("list_partitions"));
        let allocator = PartitionAllocator::new(Arc::clone(&catalog));
        let err = allocator
            .allocate(&LocationId::new("L"), 1, &template(5, 5))
            .unwrap_err();
        assert!(matches!(err, Error::Catalog { operation: "list_partitions", .. }));
        assert_eq!(*catalog.lists.lock(), 1);
        assert_eq!(*catalog.creates.lock(), 0);
    }

    #[test]
    fn test_allocate_reuses_then_creates() {
        let (catalog, partitions) = reference_catalog();
        let allocator = PartitionAllocator::new(catalog);
        let location = LocationId::new("L");
        let template = PartitionTemplate::new("L", 1_000_000, 100);

        let reused = allocator.allocate(&location, 100_000, &template).unwrap();
        assert!(!reused.created);
        assert_eq!(reused.partition.id, partitions[2].id);

        let fresh = allocator.allocate(&location, 950_000, &template).unwrap();
        assert!(fresh.created);
        assert_eq!(fresh.partition.alias, "L-partition-5");
    }

    #[test]
    fn test_allocate_rejects_oversized_object() {
        let allocator = PartitionAllocator::new(Arc::new(MemoryCatalog::new()));
        let err = allocator
            .allocate(&LocationId::new("L"), 11, &PartitionTemplate::new("L", 10, 1))
            .unwrap_err();
        assert!(matches!(err, Error::ObjectTooLarge { size: 11, max_size: 10, .. }));
        assert!(allocator
            .catalog()
            .list_partitions(&LocationId::new("L"))
            .unwrap()
            .is_empty());
    }
}
