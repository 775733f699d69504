//! Run configuration, loaded from TOML and overridden by command-line flags.
//!
//! ```toml
//! source = "/mnt"
//! destination = "target-host:10022/mnt"
//! source_snapshot_dir = "snapshot"
//! destination_snapshot_dir = ""
//! pattern = '\d{4}-\d{2}-\d{2}_\d{2}-\d{2}'
//! timeout_secs = 21600
//! ```

use crate::btrfs::{Btrfs, NamePattern, DEFAULT_PATTERN, DEFAULT_TOOL};
use crate::error::{Result, SyncError};
use crate::exec::CommandRunner;
use crate::node::{Node, NodeSpec, DEFAULT_SSH_PROGRAM};
use crate::sync::TransferOptions;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Source node spec
    pub source: Option<String>,
    /// Destination node spec
    pub destination: Option<String>,
    /// Snapshot directory relative to the source mount point
    pub source_snapshot_dir: String,
    /// Snapshot directory relative to the destination mount point
    pub destination_snapshot_dir: String,
    /// Regex a snapshot name must fully match
    pub pattern: String,
    /// Storage tool binary
    pub tool: String,
    /// Remote shell program
    pub ssh: String,
    /// Pass `--quiet` to `btrfs send`
    pub quiet_send: bool,
    /// Per-transfer deadline in seconds
    pub timeout_secs: Option<u64>,
    /// Show a progress line while streaming
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            source_snapshot_dir: "snapshot".to_string(),
            destination_snapshot_dir: String::new(),
            pattern: DEFAULT_PATTERN.to_string(),
            tool: DEFAULT_TOOL.to_string(),
            ssh: DEFAULT_SSH_PROGRAM.to_string(),
            quiet_send: true,
            timeout_secs: None,
            progress: true,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/snapsync/config.toml` (or the platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("snapsync").join("config.toml"))
    }

    /// Load `path`, or the default file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tool.trim().is_empty() {
            return Err(SyncError::Config("`tool` must not be empty".to_string()));
        }
        if self.ssh.trim().is_empty() {
            return Err(SyncError::Config("`ssh` must not be empty".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(SyncError::Config(
                "`timeout_secs` must be greater than zero".to_string(),
            ));
        }
        NamePattern::new(&self.pattern)?;
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn transfer_options(&self, dry_run: bool) -> TransferOptions {
        TransferOptions {
            dry_run,
            progress: self.progress,
            timeout: self.timeout(),
        }
    }

    /// Build a node from `spec` with this config's tool, shell and pattern.
    pub fn node(
        &self,
        spec: &str,
        snapshot_dir: &str,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Node> {
        let spec: NodeSpec = spec.parse()?;
        let pattern = NamePattern::new(&self.pattern)?;
        let btrfs = Btrfs::new(self.tool.clone()).with_quiet_send(self.quiet_send);

        Ok(Node::new(spec, pattern, runner)
            .with_snapshot_dir(snapshot_dir)
            .with_btrfs(btrfs)
            .with_ssh_program(self.ssh.clone()))
    }

    pub fn source_node(&self, runner: Arc<dyn CommandRunner>) -> Result<Node> {
        let spec = self
            .source
            .as_deref()
            .ok_or_else(|| SyncError::Config("no source node configured".to_string()))?;
        self.node(spec, &self.source_snapshot_dir, runner)
    }

    pub fn destination_node(&self, runner: Arc<dyn CommandRunner>) -> Result<Node> {
        let spec = self
            .destination
            .as_deref()
            .ok_or_else(|| SyncError::Config("no destination node configured".to_string()))?;
        self.node(spec, &self.destination_snapshot_dir, runner)
    }
}
