//! Preservo CLI - Allocation Admin Command Line Interface
//!
//! This binary registers storage locations and runs placement decisions
//! against a local catalog database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use preservo_catalog::RedbCatalog;
use preservo_common::{
    Config, LocationId, PartitionId, PartitionTemplate, StorageLocation, TenantId,
};
use preservo_placement::{
    LocationCatalog, PartitionAllocator, PartitionCatalog, PlacementPlanner, select_cheapest,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "preservo-cli")]
#[command(about = "Preservo Allocation Admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/preservo/preservo.toml")]
    config: PathBuf,

    /// Catalog database path (overrides the configuration file)
    #[arg(long, env = "PRESERVO_CATALOG")]
    catalog: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Storage location operations
    Location {
        #[command(subcommand)]
        action: LocationCommands,
    },
    /// Storage partition operations
    Partition {
        #[command(subcommand)]
        action: PartitionCommands,
    },
    /// Pick the cheapest locations meeting a quality target
    Select {
        /// Tenant ID
        #[arg(long)]
        tenant: String,
        /// Minimum combined quality
        #[arg(long)]
        min_quality: u32,
    },
    /// Find or create a partition for an object in one location
    Allocate {
        /// Location ID
        #[arg(long)]
        location: String,
        /// Object size in bytes
        #[arg(long)]
        size: u64,
    },
    /// Select locations and assign a partition in each
    Plan {
        /// Tenant ID
        #[arg(long)]
        tenant: String,
        /// Minimum combined quality
        #[arg(long)]
        min_quality: u32,
        /// Object size in bytes
        #[arg(long)]
        size: u64,
    },
    /// Record a stored copy against a partition's occupancy
    Record {
        /// Partition ID
        #[arg(long)]
        partition: String,
        /// Object size in bytes
        #[arg(long)]
        size: u64,
    },
}

#[derive(Subcommand, Debug)]
enum LocationCommands {
    /// Add or update a storage location
    Add {
        /// Location ID
        #[arg(long)]
        id: String,
        /// Owning tenant ID
        #[arg(long)]
        tenant: String,
        /// Quality rating
        #[arg(long)]
        quality: u32,
        /// Price per copy
        #[arg(long)]
        price: u64,
    },
    /// List a tenant's storage locations
    List {
        /// Tenant ID
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Subcommand, Debug)]
enum PartitionCommands {
    /// List partitions of a location
    List {
        /// Location ID
        #[arg(long)]
        location: String,
    },
    /// Create a partition under the next free alias
    Create {
        /// Location ID
        #[arg(long)]
        location: String,
        /// Byte ceiling (defaults to the configured value)
        #[arg(long)]
        max_size: Option<u64>,
        /// Object count ceiling (defaults to the configured value)
        #[arg(long)]
        max_objects: Option<u64>,
    },
}

/// Load the config file if it exists, falling back to defaults
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&config_str)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Merge CLI args with config file (CLI takes precedence)
    let mut config = load_config(&args.config)?;
    if let Some(path) = args.catalog {
        config.catalog.path = path;
    }
    config.allocation.validate()?;

    let catalog = Arc::new(RedbCatalog::open(&config.catalog.path)?);

    match args.command {
        Commands::Location { action } => match action {
            LocationCommands::Add {
                id,
                tenant,
                quality,
                price,
            } => {
                let location = StorageLocation::new(id.as_str(), tenant.as_str(), quality, price);
                catalog.put_location(&location)?;
                print_json(&location)?;
            }
            LocationCommands::List { tenant } => {
                let locations = catalog.list_storage_locations(&TenantId::new(tenant))?;
                print_json(&locations)?;
            }
        },
        Commands::Partition { action } => match action {
            PartitionCommands::List { location } => {
                let partitions = catalog.list_partitions(&LocationId::new(location))?;
                print_json(&partitions)?;
            }
            PartitionCommands::Create {
                location,
                max_size,
                max_objects,
            } => {
                let location = LocationId::new(location);
                catalog.require_location(&location)?;
                let template = PartitionTemplate::new(
                    location.clone(),
                    max_size.unwrap_or(config.allocation.default_partition_max_size),
                    max_objects.unwrap_or(config.allocation.default_partition_max_objects),
                );
                let allocator = PartitionAllocator::with_config(catalog, &config.allocation);
                let partition = allocator.create_partition_with_alias(&location, &template)?;
                print_json(&partition)?;
            }
        },
        Commands::Select {
            tenant,
            min_quality,
        } => {
            let candidates = catalog.list_storage_locations(&TenantId::new(tenant))?;
            print_json(&select_cheapest(&candidates, min_quality))?;
        }
        Commands::Allocate { location, size } => {
            let location = LocationId::new(location);
            catalog.require_location(&location)?;
            let template = PartitionTemplate::new(
                location.clone(),
                config.allocation.default_partition_max_size,
                config.allocation.default_partition_max_objects,
            );
            let allocator = PartitionAllocator::with_config(catalog, &config.allocation);
            print_json(&allocator.allocate(&location, size, &template)?)?;
        }
        Commands::Plan {
            tenant,
            min_quality,
            size,
        } => {
            let planner = PlacementPlanner::new(catalog, config.allocation);
            print_json(&planner.plan(&TenantId::new(tenant), min_quality, size)?)?;
        }
        Commands::Record { partition, size } => {
            let id: PartitionId = partition
                .parse()
                .with_context(|| format!("invalid partition id: {partition}"))?;
            print_json(&catalog.record_copy(id, size)?)?;
        }
    }

    Ok(())
}
