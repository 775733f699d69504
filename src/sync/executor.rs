//! Runs one transfer task as a `send | receive` pipeline.

use crate::error::SyncError;
use crate::exec::{shell_join, Cancellation, Meter, PipeOptions};
use crate::node::Node;
use crate::progress::TransferProgress;
use crate::snapshot::TransferTask;
use std::time::Duration;
use tracing::{debug, info};

/// Options shared by every transfer in a run.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Log what would be sent without running anything
    pub dry_run: bool,
    /// Draw a progress line while streaming
    pub progress: bool,
    /// Kill a single transfer that runs longer than this
    pub timeout: Option<Duration>,
}

/// Outcome of one transfer. `bytes_transmitted` is what got through the pipe,
/// even when the transfer failed.
#[derive(Debug)]
pub struct TransferResult {
    pub bytes_transmitted: u64,
    pub error: Option<SyncError>,
}

impl TransferResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Streams tasks from `source` to `destination`. The pipeline runs on the
/// source node's runner, the same one that lists its snapshots.
pub struct TransferExecutor<'a> {
    source: &'a Node,
    destination: &'a Node,
    options: TransferOptions,
    cancel: Cancellation,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        source: &'a Node,
        destination: &'a Node,
        options: TransferOptions,
    ) -> Self {
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

    pub async fn execute(&self, task: &TransferTask) -> TransferResult {
        let producer = self.source.send_command(task);
        let consumer = self.destination.receive_command();

        info!(
            snapshot = %task.snapshot,
            parent = ?task.parent.as_ref().map(|p| p.as_str()),
            dry_run = self.options.dry_run,
            "{} | {}",
            shell_join(&producer),
            shell_join(&consumer)
        );

        if self.options.dry_run {
            return TransferResult {
                bytes_transmitted: 0,
                error: None,
            };
        }

        let meter = Meter::new();
        let progress = TransferProgress::start(
            task.snapshot.as_str(),
            meter.clone(),
            self.options.progress,
        );
        let pipe_options = PipeOptions {
            meter: meter.clone(),
            cancel: Some(self.cancel.clone()),
            timeout: self.options.timeout,
        };

        let result = self
            .source
            .runner()
            .exec_pipe(&[producer, consumer], &pipe_options)
            .await;
        progress.finish();

        match result {
            Ok(output) => {
                debug!(snapshot = %task.snapshot, bytes = output.bytes, "transfer finished");
                TransferResult {
                    bytes_transmitted: output.bytes,
                    error: None,
                }
            }
            Err(e) => TransferResult {
                bytes_transmitted: meter.total(),
                error: Some(SyncError::Transfer {
                    snapshot: task.snapshot.to_string(),
                    source: Box::new(e),
                }),
            },
        }
    }
}
