//! Error types for Preservo
//!
//! This module defines the common error types used throughout the system.

use std::num::ParseIntError;
use thiserror::Error;

/// Common result type for Preservo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error from a catalog backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Common error type for Preservo
#[derive(Debug, Error)]
pub enum Error {
    // Allocation errors
    #[error("no partition in location {location} can hold {size} bytes")]
    NoCapacityAvailable { location: String, size: u64 },

    #[error("object of {size} bytes exceeds partition ceiling {max_size} in location {location}")]
    ObjectTooLarge {
        location: String,
        size: u64,
        max_size: u64,
    },

    #[error("quality target {required} unreachable: candidates provide {available}")]
    UnreachableQualityTarget { required: u32, available: u64 },

    #[error("malformed partition alias {alias:?}: {source}")]
    AliasParse {
        alias: String,
        #[source]
        source: ParseIntError,
    },

    #[error("partition alias already taken: {alias}")]
    AliasConflict { alias: String },

    #[error("gave up minting an alias for location {location} after {attempts} attempts")]
    AliasExhausted { location: String, attempts: u32 },

    // Catalog errors
    #[error("location not found: {0}")]
    LocationNotFound(String),

    #[error("partition not found: {0}")]
    PartitionNotFound(String),

    #[error("catalog {operation} failed for {target}: {source}")]
    Catalog {
        operation: &'static str,
        target: String,
        #[source]
        source: BoxError,
    },

    // Internal errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a backend failure with the operation and identifiers involved
    pub fn catalog(
        operation: &'static str,
        target: impl ToString,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Catalog {
            operation,
            target: target.to_string(),
            source: source.into(),
        }
    }

    /// Create a no-capacity error
    pub fn no_capacity(location: impl ToString, size: u64) -> Self {
        Self::NoCapacityAvailable {
            location: location.to_string(),
            size,
        }
    }

    /// Check if the caller can recover by creating a partition or trying another location
    #[must_use]
    pub fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::NoCapacityAvailable { .. })
    }

    /// Check if this is a retryable error.
    ///
    /// Only alias collisions qualify; the allocator re-mints on them. Catalog
    /// failures are left to the orchestrator's retry policy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AliasConflict { .. })
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LocationNotFound(_) | Self::PartitionNotFound(_))
    }

    /// Check if this error points at corrupted catalog data
    #[must_use]
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::AliasParse { .. })
    }
}
