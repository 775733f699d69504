//! Snapshot identifiers and the ordered per-node snapshot set.

use crate::error::{Result, SyncError};
use std::fmt;

/// Bare snapshot name, e.g. `2019-01-10_03-00`.
///
/// Ordering is plain string ordering, so names must be fixed width and sort by
/// creation time for incremental planning to make sense.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            return Err(SyncError::InvalidSnapshotId { id });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SnapshotId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Snapshots present on one node, ascending and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSet {
    ids: Vec<SnapshotId>,
}

impl SnapshotSet {
    /// Sort `ids` ascending. Fails if the same identifier appears twice.
    pub fn new(mut ids: Vec<SnapshotId>) -> Result<Self> {
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(SyncError::DuplicateSnapshot {
                id: pair[0].to_string(),
            });
        }
        Ok(Self { ids })
    }

    /// Build a set from raw names, validating each one.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = names
            .into_iter()
            .map(SnapshotId::new)
            .collect::<Result<Vec<_>>>()?;
        Self::new(ids)
    }

    /// Newest snapshot, if any.
    pub fn newest(&self) -> Option<&SnapshotId> {
        self.ids.last()
    }

    pub fn contains(&self, id: &SnapshotId) -> bool {
        self.ids.binary_search(id).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotId> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[SnapshotId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<'a> IntoIterator for &'a SnapshotSet {
    type Item = &'a SnapshotId;
    type IntoIter = std::slice::Iter<'a, SnapshotId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// One incremental transfer: send `snapshot` as a delta against `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub snapshot: SnapshotId,
    /// `None` only for a full, non-incremental send
    pub parent: Option<SnapshotId>,
}

impl fmt::Display for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} -> {}", parent, self.snapshot),
            None => write!(f, "(full) {}", self.snapshot),
        }
    }
}
