use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Default timeout for short remote commands (slot checks, restarts).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for archive transfers (scp of a whole release).
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

/// Generic command execution with timeout and guaranteed process kill.
///
/// Not tied to ssh — it can run any external command. The production
/// implementation uses tokio; test doubles can return canned results
/// without spawning processes.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command with the default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a command with a custom timeout (overrides default).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Run a command with stdin piped from `input`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output>;
}

/// Production `CommandRunner` — tokio process execution with a hard
/// timeout. `tokio::time::timeout` around `.output().await` does not
/// kill the child when the timeout fires on all platforms, so the
/// implementation uses `tokio::select!` with an explicit `child.kill()`.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn supervise(
        program: &str,
        mut child: tokio::process::Child,
        input: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Output> {
        // Stdin is written from a spawned task so a child that never reads
        // it cannot deadlock the stdout/stderr drain below.
        let stdin_task = input.map(|bytes| {
            let stdin_handle = child.stdin.take();
            tokio::spawn(async move {
                if let Some(mut stdin) = stdin_handle {
                    use tokio::io::AsyncWriteExt;
                    let _ = stdin.write_all(&bytes).await;
                }
            })
        });

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Drain stdout/stderr CONCURRENTLY with wait(). A child writing
        // more than the OS pipe buffer blocks on write; waiting first
        // would deadlock.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                if let Some(task) = stdin_task {
                    let _ = task.await;
                }
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Self::supervise(program, child, None, timeout).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Self::supervise(program, child, Some(input.to_vec()), self.timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout() {
        let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT);
        let out = runner.run("echo", &["hello"]).await.expect("run echo");
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn run_reports_nonzero_exit() {
        let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT);
        let out = runner.run("false", &[]).await.expect("run false");
        assert!(!out.status.success());
    }

    #[tokio::test]
    async fn run_with_stdin_pipes_input() {
        let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT);
        let out = runner
            .run_with_stdin("cat", &[], b"piped content")
            .await
            .expect("run cat");
        assert_eq!(String::from_utf8_lossy(&out.stdout), "piped content");
    }

    #[tokio::test]
    async fn run_with_timeout_kills_slow_child() {
        let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT);
        let result = runner
            .run_with_timeout("sleep", &["5"], Duration::from_millis(100))
            .await;
        let err = result.expect_err("sleep must time out").to_string();
        assert!(err.contains("timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT);
        let result = runner.run("relay-definitely-not-a-binary", &[]).await;
        assert!(result.is_err());
    }
}
