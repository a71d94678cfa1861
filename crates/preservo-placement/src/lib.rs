//! Preservo Placement - replica location selection and partition assignment
//!
//! This crate decides where the copies of an archived object go. Placement
//! happens in two independent stages:
//!
//! ## Location selection
//! [`select_cheapest`] picks the cheapest subset of a tenant's storage
//! locations whose combined quality meets the collection's replication
//! target (0/1 minimum-cost knapsack). An unreachable target is reported as
//! [`SelectionOutcome::Unreachable`], distinct from a zero target.
//!
//! ## Partition assignment
//! [`PartitionAllocator`] fills the fullest partition that still has room,
//! or opens a new one named `<location>-partition-<n>` when every partition
//! is full.
//!
//! # Example
//! ```ignore
//! use preservo_placement::{MemoryCatalog, PlacementPlanner};
//!
//! let planner = PlacementPlanner::new(Arc::new(catalog), AllocationConfig::default());
//! let plan = planner.plan(&tenant, 66, object_size)?;
//! ```

pub mod alias;
pub mod allocator;
pub mod catalog;
pub mod locks;
pub mod planner;
pub mod selector;

pub use allocator::{Allocation, PartitionAllocator, select_partition};
pub use catalog::{LocationCatalog, MemoryCatalog, PartitionCatalog};
pub use locks::LocationLocks;
pub use planner::{PartitionAssignment, PlacementPlan, PlacementPlanner};
pub use selector::{Selection, SelectionOutcome, select_cheapest};
