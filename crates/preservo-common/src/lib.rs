//! Preservo Common - Shared types and utilities
//!
//! This crate provides the catalog records, error definitions and
//! configuration shared by the allocation engine and its catalogs.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AllocationConfig, CatalogConfig, Config};
pub use error::{BoxError, Error, Result};
pub use types::*;
