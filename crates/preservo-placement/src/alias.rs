//! Partition alias minting
//!
//! Aliases have the form `<location>-partition-<n>` with `n` a positive
//! integer unique within the location.

use preservo_common::{Error, LocationId, Result, StoragePartition};

/// Marker separating the location prefix from the sequence number
pub const ALIAS_MARKER: &str = "-partition-";

/// Format the alias for sequence number `n` of a location
#[must_use]
pub fn format_alias(location: &LocationId, n: u64) -> String {
    format!("{location}{ALIAS_MARKER}{n}")
}

/// Parse the sequence number out of an alias.
///
/// Returns `Ok(None)` when the alias does not carry the marker at all, and an
/// [`Error::AliasParse`] when it does but the suffix is not an integer.
pub fn parse_suffix(alias: &str) -> Result<Option<u64>> {
    let Some((_, suffix)) = alias.rsplit_once(ALIAS_MARKER) else {
        return Ok(None);
    };
    suffix
        .parse::<u64>()
        .map(Some)
        .map_err(|source| Error::AliasParse {
            alias: alias.to_string(),
            source,
        })
}

/// Highest sequence number among `partitions`, or 0 when none carries one
pub fn max_suffix<'a>(partitions: impl IntoIterator<Item = &'a StoragePartition>) -> Result<u64> {
    let mut max = 0;
    for partition in partitions {
        if let Some(n) = parse_suffix(&partition.alias)? {
            max = max.max(n);
        }
    }
    Ok(max)
}

/// Next alias for a location given its existing partitions
pub fn next_alias<'a>(
    location: &LocationId,
    partitions: impl IntoIterator<Item = &'a StoragePartition>,
) -> Result<String> {
    let next = max_suffix(partitions)?
        .checked_add(1)
        .ok_or_else(|| Error::internal(format!("alias sequence exhausted for {location}")))?;
    Ok(format_alias(location, next))
}
