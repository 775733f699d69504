//! Decide which snapshots to send and what to diff each one against.

use crate::error::{Result, SyncError};
use crate::snapshot::{SnapshotId, SnapshotSet, TransferTask};

/// Plan the incremental transfers that bring `destination` up to `source`.
///
/// The newest destination snapshot is the anchor. Every source snapshot after
/// the anchor is sent with the snapshot before it as parent. An empty plan means
/// the destination is up to date.
pub fn plan(source: &SnapshotSet, destination: &SnapshotSet) -> Result<Vec<TransferTask>> {
    let anchor = destination.newest().ok_or(SyncError::EmptyDestination)?;

    let mut tasks = Vec::new();
    let mut cursor: Option<&SnapshotId> = None;

    for snapshot in source {
        match cursor {
            Some(parent) => {
                tasks.push(TransferTask {
                    snapshot: snapshot.clone(),
                    parent: Some(parent.clone()),
                });
                cursor = Some(snapshot);
            }
            None if snapshot == anchor => cursor = Some(snapshot),
            None => {}
        }
    }

    if cursor.is_none() {
        return Err(SyncError::NoCommonAncestor {
            anchor: anchor.to_string(),
        });
    }

    Ok(tasks)
}
