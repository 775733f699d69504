//! Parser for `btrfs subvolume list` output.
//!
//! Each record looks like:
//!
//! ```text
//! ID 6988 gen 23968 top level 5 path snapshot/2019-01-11_03-00
//! ```

use crate::error::{Result, SyncError};

/// Number of whitespace separated fields in one listing record
pub const LISTING_FIELDS: usize = 9;

/// Extract subvolume paths from listing text, preserving input order.
///
/// Blank lines are skipped. Any other line that does not have exactly
/// [`LISTING_FIELDS`] fields fails the whole listing.
pub fn parse_subvolumes(output: &str) -> Result<Vec<String>> {
    let mut paths = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != LISTING_FIELDS {
            return Err(SyncError::MalformedListing {
                line: line.to_string(),
            });
        }
        paths.push(tokens[LISTING_FIELDS - 1].to_string());
    }

    Ok(paths)
}
