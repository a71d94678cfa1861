//! Placement planning for a single object

use crate::allocator::{Allocation, PartitionAllocator};
use crate::catalog::{LocationCatalog, PartitionCatalog};
use crate::selector::{SelectionOutcome, select_cheapest};
use preservo_common::{
    AllocationConfig, Error, PartitionTemplate, Result, StorageLocation, TenantId,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Where one copy of the object goes
#[derive(Clone, Debug, Serialize)]
pub struct PartitionAssignment {
    /// Selected storage location
    pub location: StorageLocation,
    /// Partition within the location
    pub allocation: Allocation,
}

/// Result of a placement decision
#[derive(Clone, Debug, Serialize)]
pub struct PlacementPlan {
    /// Tenant the plan was made for
    pub tenant: TenantId,
    /// Requested minimum quality
    pub min_quality: u32,
    /// Size of the object in bytes
    pub object_size: u64,
    /// Combined quality of the selected locations
    pub quality: u64,
    /// Combined price of the selected locations
    pub price: u64,
    /// One assignment per selected location, in catalog order
    pub assignments: Vec<PartitionAssignment>,
}

/// Combines location selection and partition allocation.
///
/// Nothing is recorded: the caller stores the copies and then updates the
/// occupancy of each assigned partition.
pub struct PlacementPlanner<C> {
    catalog: Arc<C>,
    allocator: PartitionAllocator<C>,
    config: AllocationConfig,
}

impl<C: LocationCatalog + PartitionCatalog> PlacementPlanner<C> {
    /// Create a new planner
    #[must_use]
    pub fn new(catalog: Arc<C>, config: AllocationConfig) -> Self {
        Self {
            allocator: PartitionAllocator::with_config(Arc::clone(&catalog), &config),
            catalog,
            config,
        }
    }

    /// The partition allocator used for each selected location
    pub fn allocator(&self) -> &PartitionAllocator<C> {
        &self.allocator
    }

    /// Template for partitions created in `location` by this planner
    #[must_use]
    pub fn template_for(&self, location: &StorageLocation) -> PartitionTemplate {
        PartitionTemplate::new(
            location.id.clone(),
            self.config.default_partition_max_size,
            self.config.default_partition_max_objects,
        )
    }

    /// Compute placement for an object of `object_size` bytes needing `min_quality`.
    ///
    /// An object no selected location can take is rejected before any
    /// partition is created. A catalog failure part way through can still
    /// leave partitions created for earlier locations; they stay empty and
    /// later plans fill them first.
    pub fn plan(
        &self,
        tenant: &TenantId,
        min_quality: u32,
        object_size: u64,
    ) -> Result<PlacementPlan> {
        let candidates = self.catalog.list_storage_locations(tenant)?;
        let selection = select_cheapest(&candidates, min_quality);

        let (quality, price) = match selection.outcome {
            SelectionOutcome::NotRequired => {
                debug!(tenant = %tenant, "no quality required, nothing to place");
                (0, 0)
            }
            SelectionOutcome::Satisfied { quality, price } => (quality, price),
            SelectionOutcome::Unreachable {
                required,
                available,
            } => {
                return Err(Error::UnreachableQualityTarget {
                    required,
                    available,
                });
            }
        };

        let templates: Vec<PartitionTemplate> = selection
            .locations
            .iter()
            .map(|location| self.template_for(location))
            .collect();
        for template in templates.iter().filter(|t| !t.can_hold(object_size)) {
            // Only an existing partition with a larger ceiling can take it.
            let location = &template.storage_location_id;
            match self.allocator.find_partition_for_size(location, object_size) {
                Ok(_) => {}
                Err(e) if e.is_capacity_exhausted() => {
                    return Err(Error::ObjectTooLarge {
                        location: location.to_string(),
                        size: object_size,
                        max_size: template.max_size,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let mut assignments = Vec::with_capacity(selection.locations.len());
        for (location, template) in selection.locations.into_iter().zip(&templates) {
            let allocation = self.allocator.allocate(&location.id, object_size, template)?;
            assignments.push(PartitionAssignment {
                location,
                allocation,
            });
        }

        info!(
            tenant = %tenant,
            min_quality,
            object_size,
            quality,
            price,
            copies = assignments.len(),
            "planned placement"
        );

        Ok(PlacementPlan {
            tenant: tenant.clone(),
            min_quality,
            object_size,
            quality,
            price,
            assignments,
        })
    }
}
