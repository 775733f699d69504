//! Command execution.
//!
//! A [`CommandRunner`] runs fully built argv vectors: single commands whose
//! stdout is returned, and multi-stage pipelines whose inter-stage pipe is
//! metered. Runners hold no per-node state; wrapping a command for a remote
//! host happens before it reaches the runner (see [`crate::node::NodeAddress`]).

pub mod cancel;
pub mod local;
pub mod meter;

pub use cancel::Cancellation;
pub use local::LocalRunner;
pub use meter::{copy_metered, Meter};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Knobs for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipeOptions {
    /// Counts bytes leaving the first stage
    pub meter: Meter,
    /// Kills every stage when triggered
    pub cancel: Option<Cancellation>,
    /// Kills every stage when exceeded
    pub timeout: Option<Duration>,
}

/// Output of a finished pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Everything the last stage wrote to stdout
    pub stdout: String,
    /// Bytes that flowed from the first stage to the second
    pub bytes: u64,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command and return its stdout.
    async fn exec(&self, cmd: &[String]) -> Result<String>;

    /// Run `stages` as a pipeline, stdout of each feeding stdin of the next.
    ///
    /// All stages are started before any is awaited and completion is awaited
    /// last stage first. Failures of every stage are reported together.
    async fn exec_pipe(&self, stages: &[Vec<String>], options: &PipeOptions)
        -> Result<PipelineOutput>;
}

/// Join argv for display or for handing to a remote shell.
///
/// Arguments containing anything beyond a conservative safe set are single quoted.
pub fn shell_join<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
