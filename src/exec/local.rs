//! Runs commands as local child processes with tokio.

use super::{copy_metered, shell_join, Cancellation, CommandRunner, Meter, PipeOptions, PipelineOutput};
use crate::error::{Result, StageFailure, SyncError};
use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tracing::debug;

/// Spawns argv vectors on this host. Stateless; share it freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }
}

fn build_command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv.split_first().ok_or_else(|| SyncError::Spawn {
        command: String::new(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
    })?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

async fn drain_stderr(stderr: Option<ChildStderr>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stderr) = stderr {
        let _ = stderr.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).trim().to_string()
}

/// Wait for every child, last stage first. Results are returned in stage order.
async fn wait_reverse(children: &mut [Child]) -> Vec<io::Result<ExitStatus>> {
    let mut statuses = Vec::with_capacity(children.len());
    for child in children.iter_mut().rev() {
        statuses.push(child.wait().await);
    }
    statuses.reverse();
    statuses
}

async fn kill_all(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = child.start_kill();
    }
    for child in children.iter_mut() {
        let _ = child.wait().await;
    }
}

async fn cancelled(cancel: Option<&Cancellation>) {
    match cancel {
        Some(cancel) => cancel.cancelled().await,
        None => futures::future::pending().await,
    }
}

async fn expired(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => futures::future::pending().await,
    }
}

fn describe_exit(status: ExitStatus, stderr: &str) -> String {
    if stderr.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, stderr)
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn exec(&self, cmd: &[String]) -> Result<String> {
        let shown = shell_join(cmd);
        debug!(command = %shown, "exec");

        let mut command = build_command(cmd)?;
        command.stdin(Stdio::null());
        let output = command.output().await.map_err(|source| SyncError::Spawn {
            command: shown.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(SyncError::CommandFailed {
                command: shown,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn exec_pipe(
        &self,
        stages: &[Vec<String>],
        options: &PipeOptions,
    ) -> Result<PipelineOutput> {
        if stages.is_empty() {
            return Ok(PipelineOutput::default());
        }

        let displays: Vec<String> = stages.iter().map(|argv| shell_join(argv)).collect();
        let commands = stages
            .iter()
            .map(|argv| build_command(argv))
            .collect::<Result<Vec<_>>>()?;
        let bytes_before = options.meter.total();

        // Start every stage before waiting on any of them.
        let mut children: Vec<Child> = Vec::with_capacity(commands.len());
        for (i, mut command) in commands.into_iter().enumerate() {
            command
                .stdin(if i == 0 { Stdio::null() } else { Stdio::piped() })
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            debug!(stage = i, command = %displays[i], "spawning pipeline stage");
            match command.spawn() {
                Ok(child) => children.push(child),
                Err(e) => {
                    kill_all(&mut children).await;
                    return Err(SyncError::Pipeline {
                        failures: vec![StageFailure {
                            stage: i,
                            command: displays[i].clone(),
                            reason: format!("failed to spawn: {}", e),
                        }],
                        bytes: 0,
                    });
                }
            }
        }

        let mut stderr_tasks: Vec<_> = children
            .iter_mut()
            .map(|child| tokio::spawn(drain_stderr(child.stderr.take())))
            .collect();

        let mut link_tasks = Vec::with_capacity(children.len() - 1);
        for i in 0..children.len() - 1 {
            let upstream = children[i].stdout.take();
            let downstream = children[i + 1].stdin.take();
            let meter = if i == 0 {
                options.meter.clone()
            } else {
                Meter::new()
            };
            link_tasks.push(tokio::spawn(async move {
                match (upstream, downstream) {
                    (Some(upstream), Some(downstream)) => {
                        copy_metered(upstream, downstream, meter).await
                    }
                    _ => Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "stage pipe was not captured",
                    )),
                }
            }));
        }

        let last_stdout = children.last_mut().and_then(|child| child.stdout.take());
        let mut output_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stdout) = last_stdout {
                stdout.read_to_end(&mut buf).await?;
            }
            Ok::<_, io::Error>(buf)
        });

        // The deadline covers draining too: a detached grandchild can hold a
        // stage's stderr open long after the stage itself exited.
        let finished = tokio::select! {
            done = async {
                let statuses = wait_reverse(&mut children).await;
                let stderrs = join_all(stderr_tasks.iter_mut()).await;
                let links = join_all(link_tasks.iter_mut()).await;
                let output = (&mut output_task).await;
                (statuses, stderrs, links, output)
            } => Ok(done),
            _ = cancelled(options.cancel.as_ref()) => Err(SyncError::Cancelled),
            _ = expired(options.timeout) => Err(SyncError::TimedOut {
                after: options.timeout.unwrap_or_default(),
            }),
        };

        let (statuses, stderrs, links, output) = match finished {
            Ok(done) => done,
            Err(e) => {
                debug!(error = %e, "stopping pipeline");
                kill_all(&mut children).await;
                for task in &stderr_tasks {
                    task.abort();
                }
                for task in &link_tasks {
                    task.abort();
                }
                output_task.abort();
                return Err(e);
            }
        };
        let stderrs: Vec<String> = stderrs
            .into_iter()
            .map(|r| r.unwrap_or_default())
            .collect();

        let mut failures = Vec::new();
        for (i, status) in statuses.into_iter().enumerate() {
            match status {
                Ok(status) if status.success() => {}
                Ok(status) => failures.push(StageFailure {
                    stage: i,
                    command: displays[i].clone(),
                    reason: describe_exit(status, &stderrs[i]),
                }),
                Err(e) => failures.push(StageFailure {
                    stage: i,
                    command: displays[i].clone(),
                    reason: format!("failed to wait: {}", e),
                }),
            }
        }

        for (i, link) in links.into_iter().enumerate() {
            let reason = match link {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => format!("stream error: {}", e),
                Err(e) => format!("stream task failed: {}", e),
            };
            failures.push(StageFailure {
                stage: i,
                command: format!("{} | {}", displays[i], displays[i + 1]),
                reason,
            });
        }

        let last = stages.len() - 1;
        let stdout = match output {
            Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
            Ok(Err(e)) => {
                failures.push(StageFailure {
                    stage: last,
                    command: displays[last].clone(),
                    reason: format!("failed to read output: {}", e),
                });
                String::new()
            }
            Err(e) => {
                failures.push(StageFailure {
                    stage: last,
                    command: displays[last].clone(),
                    reason: format!("output task failed: {}", e),
                });
                String::new()
            }
        };

        let bytes = options.meter.total() - bytes_before;
        if !failures.is_empty() {
            failures.sort_by_key(|f| f.stage);
            return Err(SyncError::Pipeline { failures, bytes });
        }

        Ok(PipelineOutput { stdout, bytes })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_exec_success() {
        let out = LocalRunner.exec(&argv(&["echo", "foo"])).await.unwrap();
        assert_eq!(out, "foo\n");

        let out = LocalRunner.exec(&argv(&["true"])).await.unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit() {
        let err = LocalRunner.exec(&argv(&["false"])).await.unwrap_err();
        assert!(matches!(err, SyncError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_exec_missing_binary() {
        let err = LocalRunner
            .exec(&argv(&["/foo/bar/fizz/buzz"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_exec_empty_command() {
        assert!(LocalRunner.exec(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_pipe_echo_cat() {
        let options = PipeOptions::default();
        let out = LocalRunner
            .exec_pipe(&[argv(&["echo", "foo"]), argv(&["cat"])], &options)
            .await
            .unwrap();
        assert_eq!(out.stdout, "foo\n");
        assert_eq!(out.bytes, 4);
        assert_eq!(options.meter.total(), 4);
    }

    #[tokio::test]
    async fn test_pipe_meters_large_stream() {
        let out = LocalRunner
            .exec_pipe(
                &[
                    argv(&["head", "-c", "1048576", "/dev/zero"]),
                    argv(&["wc", "-c"]),
                ],
                &PipeOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.bytes, 1048576);
        assert_eq!(out.stdout.trim(), "1048576");
    }

    #[tokio::test]
    async fn test_pipe_three_stages() {
        let out = LocalRunner
            .exec_pipe(
                &[argv(&["echo", "hello"]), argv(&["cat"]), argv(&["cat"])],
                &PipeOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.bytes, 6);
    }

    #[tokio::test]
    async fn test_pipe_reports_all_failed_stages() {
        let err = LocalRunner
            .exec_pipe(
                &[
                    argv(&["sh", "-c", "echo producer broke >&2; exit 4"]),
                    argv(&["sh", "-c", "cat >/dev/null; echo consumer broke >&2; exit 3"]),
                ],
                &PipeOptions::default(),
            )
            .await
            .unwrap_err();

        match err {
            SyncError::Pipeline { failures, .. } => {
                let producer = failures.iter().find(|f| f.stage == 0).unwrap();
                assert!(producer.reason.contains("producer broke"));
                let consumer = failures.iter().find(|f| f.stage == 1).unwrap();
                assert!(consumer.reason.contains("consumer broke"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pipe_spawn_failure() {
        let err = LocalRunner
            .exec_pipe(
                &[argv(&["echo", "foo"]), argv(&["/foo/bar/fizz/buzz"])],
                &PipeOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            SyncError::Pipeline { failures, bytes } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stage, 1);
                assert_eq!(bytes, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pipe_timeout_kills_stages() {
        let options = PipeOptions {
            timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let err = LocalRunner
            .exec_pipe(&[argv(&["sleep", "30"]), argv(&["cat"])], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_pipe_cancellation() {
        let cancel = Cancellation::new();
        let options = PipeOptions {
            cancel: Some(cancel.clone()),
            ..Default::default()
        };
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let err = LocalRunner
            .exec_pipe(&[argv(&["sleep", "30"]), argv(&["cat"])], &options)
            .await
            .unwrap_err();
        trigger.await.unwrap();
        assert!(matches!(err, SyncError::Cancelled));
    }

    #[tokio::test]
    async fn test_pipe_timeout_covers_lingering_stderr() {
        // The background sleep keeps the producer's stderr open after it exits.
        let options = PipeOptions {
            timeout: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let err = LocalRunner
            .exec_pipe(
                &[
                    argv(&["sh", "-c", "sleep 5 >/dev/null & echo hi"]),
                    argv(&["cat"]),
                ],
                &options,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_pipe_cancellation_covers_lingering_stderr() {
        let cancel = Cancellation::new();
        let options = PipeOptions {
            cancel: Some(cancel.clone()),
            ..Default::default()
        };
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });
        let started = std::time::Instant::now();
        let err = LocalRunner
            .exec_pipe(
                &[
                    argv(&["sh", "-c", "sleep 5 >/dev/null & echo hi"]),
                    argv(&["cat"]),
                ],
                &options,
            )
            .await
            .unwrap_err();
        trigger.await.unwrap();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
