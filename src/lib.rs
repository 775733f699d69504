//! Incremental btrfs snapshot replication.
//!
//! ```text
//! source (local or ssh)                         destination (local or ssh)
//! +--------------------+    metered pipe    +-----------------------+
//! | btrfs send -p P S  | -----------------> | btrfs receive <dir>   |
//! +--------------------+                    +-----------------------+
//! ```
//!
//! Both nodes are listed, the chain of snapshots newer than the destination's
//! newest one is planned, and each snapshot is streamed as a delta against its
//! predecessor. A failed transfer is rolled back on the destination and stops
//! the run.

pub mod btrfs;
pub mod config;
pub mod error;
pub mod exec;
pub mod node;
pub mod progress;
pub mod snapshot;
pub mod sync;

pub use config::Config;
pub use error::{Result, StageFailure, SyncError};
pub use exec::{Cancellation, CommandRunner, LocalRunner, PipeOptions, PipelineOutput};
pub use node::{Node, NodeAddress, NodeSpec};
pub use progress::format_bytes;
pub use snapshot::{SnapshotId, SnapshotSet, TransferTask};
pub use sync::{plan, SyncReport, Synchronizer, TransferOptions, TransferResult};
