use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// One failed stage of a command pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Position of the stage in the pipeline (0 = producer)
    pub stage: usize,
    /// Command line of the stage, space joined
    pub command: String,
    /// What went wrong (exit status and stderr, spawn error, broken stream)
    pub reason: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} `{}`: {}", self.stage, self.command, self.reason)
    }
}

fn join_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unexpected subvolume listing line (expected 9 fields): {line:?}")]
    MalformedListing { line: String },

    #[error("Failed to transfer snapshot {snapshot}")]
    Transfer {
        snapshot: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Failed to roll back snapshot {snapshot}: {source}")]
    Rollback {
        snapshot: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Destination has no snapshots; seed it with a full transfer first")]
    EmptyDestination,

    #[error("Newest destination snapshot {anchor} not found at source; no common ancestor")]
    NoCommonAncestor { anchor: String },

    #[error("Duplicate snapshot identifier: {id}")]
    DuplicateSnapshot { id: String },

    #[error("Invalid snapshot identifier: {id:?}")]
    InvalidSnapshotId { id: String },

    #[error("Pipeline failed after {bytes} bytes: {}", join_failures(.failures))]
    Pipeline {
        failures: Vec<StageFailure>,
        bytes: u64,
    },

    #[error("Command `{command}` failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Transfer timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("Invalid node specification {spec:?}: {reason}")]
    InvalidNodeSpec { spec: String, reason: String },

    #[error("Invalid snapshot name pattern")]
    InvalidPattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyncError {
    /// True when the run was stopped by the operator. A timeout is a failure.
    pub fn is_cancellation(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::Transfer { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_lists_every_stage() {
        let err = SyncError::Pipeline {
            failures: vec![
                StageFailure {
                    stage: 0,
                    command: "btrfs send".to_string(),
                    reason: "exit status: 1".to_string(),
                },
                StageFailure {
                    stage: 1,
                    command: "btrfs receive /mnt".to_string(),
                    reason: "exit status: 2".to_string(),
                },
            ],
            bytes: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("42 bytes"));
        assert!(msg.contains("stage 0 `btrfs send`"));
        assert!(msg.contains("stage 1 `btrfs receive /mnt`"));
    }

    #[test]
    fn test_cancellation_seen_through_transfer() {
        let err = SyncError::Transfer {
            snapshot: "2019-01-10_03-00".to_string(),
            source: Box::new(SyncError::Cancelled),
        };
        assert!(err.is_cancellation());
        assert!(!SyncError::EmptyDestination.is_cancellation());
    }

    #[test]
    fn test_timeout_is_not_cancellation() {
        let err = SyncError::Transfer {
            snapshot: "2019-01-10_03-00".to_string(),
            source: Box::new(SyncError::TimedOut {
                after: Duration::from_secs(5),
            }),
        };
        assert!(!err.is_cancellation());
    }
}
