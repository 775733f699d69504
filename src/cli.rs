use clap::{ArgAction, Args, Parser, Subcommand};
use snapsync::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "snapsync")]
#[command(about = "Incrementally replicate btrfs snapshots to another host", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: ~/.config/snapsync/config.toml)
    #[arg(long, global = true, env = "SNAPSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Regex a snapshot name must fully match
    #[arg(long, global = true)]
    pub pattern: Option<String>,

    /// Storage tool binary
    #[arg(long, global = true)]
    pub tool: Option<String>,

    /// Remote shell program
    #[arg(long, global = true)]
    pub ssh: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send every source snapshot newer than the destination's newest one
    Sync(SyncArgs),
    /// Show the transfers a sync would run
    Plan(PairArgs),
    /// List the snapshots on one node
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct PairArgs {
    /// Source node: /path or host[:port]/path
    pub source: Option<String>,

    /// Destination node: /path or host[:port]/path
    pub destination: Option<String>,

    /// Snapshot directory relative to the source mount point
    #[arg(long)]
    pub source_dir: Option<String>,

    /// Snapshot directory relative to the destination mount point
    #[arg(long)]
    pub destination_dir: Option<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Log the transfers without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Don't draw a progress line
    #[arg(long)]
    pub no_progress: bool,

    /// Abort a single transfer after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Node: /path or host[:port]/path
    pub node: String,

    /// Snapshot directory relative to the mount point
    #[arg(long, default_value = "")]
    pub snapshot_dir: String,
}

impl Cli {
    /// Fold global flags into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(pattern) = &self.pattern {
            config.pattern = pattern.clone();
        }
        if let Some(tool) = &self.tool {
            config.tool = tool.clone();
        }
        if let Some(ssh) = &self.ssh {
            config.ssh = ssh.clone();
        }
    }
}

impl PairArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source = Some(source.clone());
        }
        if let Some(destination) = &self.destination {
            config.destination = Some(destination.clone());
        }
        if let Some(dir) = &self.source_dir {
            config.source_snapshot_dir = dir.clone();
        }
        if let Some(dir) = &self.destination_dir {
            config.destination_snapshot_dir = dir.clone();
        }
    }
}

impl SyncArgs {
    pub fn apply(&self, config: &mut Config) {
        self.pair.apply(config);
        if self.no_progress {
            config.progress = false;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }
    }
}
