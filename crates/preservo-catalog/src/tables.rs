//! Redb table definitions for the persistent catalog.
//!
//! Row keys embed a zero-padded sequence number so that range scans return
//! rows in insertion order, which is the catalog order the allocator relies
//! on for tie-breaking.

use redb::TableDefinition;

// Locations
// Key: "tenant\x00seq", Value: bincode StorageLocation
pub const LOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("locations");
// Key: location id, Value: LOCATIONS key
pub const LOCATION_KEYS: TableDefinition<&str, &str> = TableDefinition::new("location_keys");

// Partitions
// Key: "location\x00seq", Value: bincode StoragePartition
pub const PARTITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("partitions");
// Key: partition id, Value: PARTITIONS key
pub const PARTITION_KEYS: TableDefinition<&str, &str> = TableDefinition::new("partition_keys");
// Key: "location\x00alias", Value: partition id. Enforces alias uniqueness per location.
pub const PARTITION_ALIASES: TableDefinition<&str, &str> =
    TableDefinition::new("partition_aliases");

// Key: sequence name, Value: last issued number
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const LOCATION_SEQ: &str = "locations";
pub const PARTITION_SEQ: &str = "partitions";

/// Key of a row ordered by `seq` under `owner`
pub fn row_key(owner: &str, seq: u64) -> String {
    format!("{owner}\x00{seq:020}")
}

/// Bounds covering every row of `owner`
pub fn owner_range(owner: &str) -> (String, String) {
    (format!("{owner}\x00"), format!("{owner}\x01"))
}

/// Key of an alias within a location
pub fn alias_key(location: &str, alias: &str) -> String {
    format!("{location}\x00{alias}")
}
