//! Preservo Catalog - persistent catalog of storage locations and partitions
//!
//! Implements the catalog collaborators of the allocation engine on top of
//! redb, enforcing alias uniqueness and partition capacity transactionally.

pub mod store;
pub mod tables;

// Re-exports
pub use store::{CatalogStoreError, RedbCatalog};
