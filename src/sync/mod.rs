//! Snapshot synchronization between a source and a destination node.
//!
//! A run lists both nodes, plans the incremental chain starting at the newest
//! destination snapshot and executes the tasks one at a time. The first failed
//! task is rolled back on the destination and ends the run.

pub mod executor;
pub mod plan;

pub use executor::{TransferExecutor, TransferOptions, TransferResult};
pub use plan::plan;

use crate::error::{Result, SyncError};
use crate::exec::Cancellation;
use crate::node::Node;
use crate::progress::format_bytes;
use crate::snapshot::{SnapshotId, SnapshotSet, TransferTask};
use std::slice;
use tracing::{info, warn};

/// One snapshot that made it to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredSnapshot {
    pub snapshot: SnapshotId,
    pub parent: Option<SnapshotId>,
    pub bytes: u64,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub transferred: Vec<TransferredSnapshot>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn bytes_transmitted(&self) -> u64 {
        self.transferred.iter().map(|t| t.bytes).sum()
    }
}

pub struct Synchronizer {
    source: Node,
    destination: Node,
    options: TransferOptions,
    cancel: Cancellation,
}

impl Synchronizer {
    pub fn new(source: Node, destination: Node, options: TransferOptions) -> Self {
        Self {
            source,
            destination,
            options,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source(&self) -> &Node {
        &self.source
    }

    pub fn destination(&self) -> &Node {
        &self.destination
    }

    /// Fresh snapshot sets of both nodes.
    pub async fn list(&self) -> Result<(SnapshotSet, SnapshotSet)> {
        let (source, destination) = tokio::try_join!(
            self.source.list_snapshots(),
            self.destination.list_snapshots()
        )?;
        info!(
            source = %self.source,
            count = source.len(),
            newest = ?source.newest().map(|s| s.as_str()),
            "source snapshots"
        );
        info!(
            destination = %self.destination,
            count = destination.len(),
            newest = ?destination.newest().map(|s| s.as_str()),
            "destination snapshots"
        );
        Ok((source, destination))
    }

    /// List both nodes and plan the transfers without running them.
    pub async fn plan(&self) -> Result<Vec<TransferTask>> {
        let (source, destination) = self.list().await?;
        plan(&source, &destination)
    }

    /// List, plan and transfer.
    pub async fn run(&self) -> Result<SyncReport> {
        let tasks = self.plan().await?;
        if tasks.is_empty() {
            info!(destination = %self.destination, "destination is up to date");
        }
        self.run_tasks(&tasks).await
    }

    /// Execute `tasks` in order, stopping at the first failure.
    pub async fn run_tasks(&self, tasks: &[TransferTask]) -> Result<SyncReport> {
        let executor = TransferExecutor::new(&self.source, &self.destination, self.options.clone())
            .with_cancellation(self.cancel.clone());

        let mut report = SyncReport {
            transferred: Vec::with_capacity(tasks.len()),
            dry_run: self.options.dry_run,
        };

        for (i, task) in tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            info!(task = i + 1, of = tasks.len(), "transferring {}", task);
            let result = executor.execute(task).await;

            if let Some(err) = result.error {
                self.rollback(task).await;
                return Err(err);
            }

            info!(
                snapshot = %task.snapshot,
                bytes = result.bytes_transmitted,
                "transferred {}",
                format_bytes(result.bytes_transmitted)
            );
            report.transferred.push(TransferredSnapshot {
                snapshot: task.snapshot.clone(),
                parent: task.parent.clone(),
                bytes: result.bytes_transmitted,
            });
        }

        Ok(report)
    }

    /// Remove whatever a failed task left at the destination. Failures are
    /// logged; the caller reports the transfer error.
    async fn rollback(&self, task: &TransferTask) {
        warn!(snapshot = %task.snapshot, "transfer failed, removing partial snapshot");
        if let Err(e) = self
            .destination
            .delete_snapshots(slice::from_ref(&task.snapshot))
            .await
        {
            let err = SyncError::Rollback {
                snapshot: task.snapshot.to_string(),
                source: Box::new(e),
            };
            warn!(error = %err, "rollback failed");
        }
    }
}
