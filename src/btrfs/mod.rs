//! btrfs command lines and output parsing.

pub mod filter;
pub mod listing;

pub use filter::{filter_snapshots, normalize_dir, NamePattern, DEFAULT_PATTERN};
pub use listing::{parse_subvolumes, LISTING_FIELDS};

/// Default storage tool binary
pub const DEFAULT_TOOL: &str = "btrfs";

/// Builds argv vectors for the storage tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Btrfs {
    tool: String,
    quiet_send: bool,
}

impl Default for Btrfs {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl Btrfs {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            quiet_send: false,
        }
    }

    /// Pass `--quiet` to `send` so only the stream reaches stdout's consumer.
    pub fn with_quiet_send(mut self, quiet: bool) -> Self {
        self.quiet_send = quiet;
        self
    }

    pub fn list(&self, mount_point: &str) -> Vec<String> {
        vec![
            self.tool.clone(),
            "subvolume".to_string(),
            "list".to_string(),
            mount_point.to_string(),
        ]
    }

    pub fn send(&self, parent: Option<&str>, snapshot: &str) -> Vec<String> {
        let mut cmd = vec![self.tool.clone(), "send".to_string()];
        if self.quiet_send {
            cmd.push("--quiet".to_string());
        }
        if let Some(parent) = parent {
            cmd.push("-p".to_string());
            cmd.push(parent.to_string());
        }
        cmd.push(snapshot.to_string());
        cmd
    }

    pub fn receive(&self, target_dir: &str) -> Vec<String> {
        vec![
            self.tool.clone(),
            "receive".to_string(),
            target_dir.to_string(),
        ]
    }

    pub fn delete<S: AsRef<str>>(&self, paths: &[S]) -> Vec<String> {
        let mut cmd = vec![
            self.tool.clone(),
            "subvolume".to_string(),
            "delete".to_string(),
        ];
        cmd.extend(paths.iter().map(|p| p.as_ref().to_string()));
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_incremental() {
        let btrfs = Btrfs::default();
        assert_eq!(
            btrfs.send(Some("/foo/bar/3"), "/foo/bar/4"),
            vec!["btrfs", "send", "-p", "/foo/bar/3", "/foo/bar/4"]
        );
    }

    #[test]
    fn test_send_quiet_full() {
        let btrfs = Btrfs::new("/sbin/btrfs").with_quiet_send(true);
        assert_eq!(
            btrfs.send(None, "/mnt/snapshot/1"),
            vec!["/sbin/btrfs", "send", "--quiet", "/mnt/snapshot/1"]
        );
    }

    #[test]
    fn test_list_receive_delete() {
        let btrfs = Btrfs::default();
        assert_eq!(btrfs.list("/foo"), vec!["btrfs", "subvolume", "list", "/foo"]);
        assert_eq!(btrfs.receive("/foo"), vec!["btrfs", "receive", "/foo"]);
        assert_eq!(
            btrfs.delete(&["/foo/1", "/foo/2"]),
            vec!["btrfs", "subvolume", "delete", "/foo/1", "/foo/2"]
        );
    }
}
