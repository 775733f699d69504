//! One replication endpoint: a mounted btrfs filesystem, local or over ssh.

pub mod address;

pub use address::{NodeAddress, NodeSpec, DEFAULT_SSH_PORT, DEFAULT_SSH_PROGRAM};

use crate::btrfs::{filter_snapshots, normalize_dir, parse_subvolumes, Btrfs, NamePattern};
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::snapshot::{SnapshotId, SnapshotSet, TransferTask};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct Node {
    address: NodeAddress,
    mount_point: PathBuf,
    snapshot_dir: String,
    pattern: NamePattern,
    btrfs: Btrfs,
    ssh_program: String,
    runner: Arc<dyn CommandRunner>,
}

impl Node {
    pub fn new(spec: NodeSpec, pattern: NamePattern, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            address: spec.address,
            mount_point: spec.mount_point,
            snapshot_dir: String::new(),
            pattern,
            btrfs: Btrfs::default(),
            ssh_program: DEFAULT_SSH_PROGRAM.to_string(),
            runner,
        }
    }

    /// Snapshots live in `dir` relative to the mount point.
    pub fn with_snapshot_dir(mut self, dir: &str) -> Self {
        self.snapshot_dir = normalize_dir(dir).to_string();
        self
    }

    pub fn with_btrfs(mut self, btrfs: Btrfs) -> Self {
        self.btrfs = btrfs;
        self
    }

    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn snapshot_dir(&self) -> &str {
        &self.snapshot_dir
    }

    /// Runner this node's commands go through. Transfers starting at this node
    /// run their pipeline on it as well.
    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Directory holding the snapshots.
    pub fn snapshot_root(&self) -> PathBuf {
        if self.snapshot_dir.is_empty() {
            self.mount_point.clone()
        } else {
            self.mount_point.join(&self.snapshot_dir)
        }
    }

    /// Absolute path of `id` on this node.
    pub fn snapshot_path(&self, id: &SnapshotId) -> String {
        self.snapshot_root()
            .join(id.as_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Wrap `argv` for this node's address.
    fn command(&self, argv: Vec<String>) -> Vec<String> {
        self.address.wrap(&self.ssh_program, argv)
    }

    /// List, filter and sort this node's snapshots. Always queries the node.
    pub async fn list_snapshots(&self) -> Result<SnapshotSet> {
        let mount = self.mount_point.to_string_lossy();
        let output = self.runner.exec(&self.command(self.btrfs.list(&mount))).await?;

        let subvolumes = parse_subvolumes(&output)?;
        let names = filter_snapshots(&subvolumes, &self.snapshot_dir, &self.pattern);
        debug!(
            node = %self,
            subvolumes = subvolumes.len(),
            snapshots = names.len(),
            "listed snapshots"
        );

        SnapshotSet::from_names(names)
    }

    /// Delete `ids` with one batched command. Nothing is run for an empty list.
    pub async fn delete_snapshots(&self, ids: &[SnapshotId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let paths: Vec<String> = ids.iter().map(|id| self.snapshot_path(id)).collect();
        debug!(node = %self, ?paths, "deleting snapshots");
        self.runner
            .exec(&self.command(self.btrfs.delete(&paths)))
            .await?;
        Ok(())
    }

    /// Producer command streaming `task` out of this node.
    pub fn send_command(&self, task: &TransferTask) -> Vec<String> {
        let parent = task.parent.as_ref().map(|p| self.snapshot_path(p));
        let snapshot = self.snapshot_path(&task.snapshot);
        self.command(self.btrfs.send(parent.as_deref(), &snapshot))
    }

    /// Consumer command materializing a stream under this node's snapshot directory.
    pub fn receive_command(&self) -> Vec<String> {
        let target = self.snapshot_root().to_string_lossy().into_owned();
        self.command(self.btrfs.receive(&target))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            NodeAddress::Local => write!(f, "{}", self.mount_point.display()),
            remote => write!(f, "{}{}", remote, self.mount_point.display()),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("mount_point", &self.mount_point)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btrfs::DEFAULT_PATTERN;
    use crate::error::SyncError;
    use crate::exec::{PipeOptions, PipelineOutput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers `exec` with a canned result when invoked with the expected command.
    struct MockRunner {
        expected: Vec<String>,
        result: std::result::Result<String, String>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        fn new(expected: &[&str], result: std::result::Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                expected: expected.iter().map(|s| s.to_string()).collect(),
                result: result.map(str::to_string).map_err(str::to_string),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn exec(&self, cmd: &[String]) -> Result<String> {
            self.calls.lock().unwrap().push(cmd.to_vec());
            if cmd != self.expected.as_slice() {
                return Err(SyncError::Config(format!("unexpected cmd: {cmd:?}")));
            }
            self.result.clone().map_err(|stderr| SyncError::CommandFailed {
                command: cmd.join(" "),
                status: "exit status: 1".to_string(),
                stderr,
            })
        }

        async fn exec_pipe(
            &self,
            _stages: &[Vec<String>],
            _options: &PipeOptions,
        ) -> Result<PipelineOutput> {
            Err(SyncError::Config("exec_pipe not expected".to_string()))
        }
    }

    fn node(spec: &str, dir: &str, runner: Arc<MockRunner>) -> Node {
        Node::new(
            spec.parse().unwrap(),
            NamePattern::new(DEFAULT_PATTERN).unwrap(),
            runner,
        )
        .with_snapshot_dir(dir)
    }

    const LISTING: &str = "ID 6990 gen 24002 top level 5 path snapshot/2019-01-13_03-00\n\
                           ID 6988 gen 23968 top level 5 path snapshot/2019-01-11_03-00\n\
                           ID 6989 gen 23981 top level 5 path snapshot/2019-01-12_03-00\n\
                           ID 7001 gen 24100 top level 5 path home\n";

    #[tokio::test]
    async fn test_list_snapshots_sorted() {
        let runner = MockRunner::new(&["btrfs", "subvolume", "list", "/foo"], Ok(LISTING));
        let snapshots = node("/foo", "snapshot", runner).list_snapshots().await.unwrap();
        let names: Vec<_> = snapshots.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["2019-01-11_03-00", "2019-01-12_03-00", "2019-01-13_03-00"]
        );
    }

    #[tokio::test]
    async fn test_list_snapshots_remote() {
        let runner = MockRunner::new(
            &["ssh", "-p10022", "target-host", "btrfs subvolume list /mnt"],
            Ok("ID 1 gen 2 top level 5 path 2019-01-11_03-00\n"),
        );
        let snapshots = node("target-host:10022/mnt", "", runner)
            .list_snapshots()
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_list_snapshots_exec_error() {
        let runner = MockRunner::new(&["btrfs", "subvolume", "list", "/foo"], Err("mock error"));
        let err = node("/foo", "snapshot", runner).list_snapshots().await.unwrap_err();
        assert!(matches!(err, SyncError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_list_snapshots_malformed() {
        let runner = MockRunner::new(&["btrfs", "subvolume", "list", "/foo"], Ok("foo"));
        let err = node("/foo", "snapshot", runner).list_snapshots().await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedListing { .. }));
    }

    #[tokio::test]
    async fn test_list_snapshots_duplicate() {
        let listing = "ID 1 gen 2 top level 5 path snapshot/2019-01-11_03-00\n\
                       ID 2 gen 3 top level 5 path snapshot/2019-01-11_03-00\n";
        let runner = MockRunner::new(&["btrfs", "subvolume", "list", "/foo"], Ok(listing));
        let err = node("/foo", "snapshot", runner).list_snapshots().await.unwrap_err();
        assert!(matches!(err, SyncError::DuplicateSnapshot { .. }));
    }

    #[tokio::test]
    async fn test_delete_empty_is_noop() {
        let runner = MockRunner::new(&[], Ok(""));
        node("/foo", "snapshot", runner.clone())
            .delete_snapshots(&[])
            .await
            .unwrap();
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_batched() {
        let runner = MockRunner::new(
            &["btrfs", "subvolume", "delete", "/foo/snapshot/1", "/foo/snapshot/2"],
            Ok(""),
        );
        let ids = [SnapshotId::new("1").unwrap(), SnapshotId::new("2").unwrap()];
        node("/foo", "snapshot/", runner.clone())
            .delete_snapshots(&ids)
            .await
            .unwrap();
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_transfer_commands() {
        let runner = MockRunner::new(&[], Ok(""));
        let source = node("/foo", "bar", runner.clone());
        let destination = node("foo:123/foo", "", runner);
        let task = TransferTask {
            snapshot: SnapshotId::new("4").unwrap(),
            parent: Some(SnapshotId::new("3").unwrap()),
        };

        assert_eq!(
            source.send_command(&task),
            vec!["btrfs", "send", "-p", "/foo/bar/3", "/foo/bar/4"]
        );
        assert_eq!(
            destination.receive_command(),
            vec!["ssh", "-p123", "foo", "btrfs receive /foo"]
        );
    }
}
