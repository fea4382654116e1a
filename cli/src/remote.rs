//! Remote host abstraction — drives the `ssh`/`scp` binaries, enabling
//! test doubles for the whole deploy state machine.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result};

use crate::command_runner::{
    CommandRunner, DEFAULT_CMD_TIMEOUT, TRANSFER_TIMEOUT, TokioCommandRunner,
};

/// Connection parameters for one remote host.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub key_path: PathBuf,
    /// SSH port (not the service port).
    pub ssh_port: u16,
}

impl SshTarget {
    /// `user@host` form used by ssh and scp.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Single-quote a string for inclusion in a remote shell command.
///
/// ssh joins its trailing arguments into one shell command on the remote
/// side, so every interpolated path or value must be quoted.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Abstraction over remote access, enabling test doubles.
///
/// The production implementation shells out to `ssh`/`scp` with
/// BatchMode and a supplied identity file.
#[allow(async_fn_in_trait)]
pub trait Remote {
    /// Run `command` through the remote shell.
    ///
    /// # Errors
    ///
    /// Returns an error if ssh cannot be spawned or times out.
    async fn exec(&self, command: &str) -> Result<Output>;

    /// Run `command` with stdin piped from `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if ssh cannot be spawned or times out.
    async fn exec_with_stdin(&self, command: &str, input: &[u8]) -> Result<Output>;

    /// Copy `local` to `remote_path` on the host.
    ///
    /// # Errors
    ///
    /// Returns an error if scp cannot be spawned or times out.
    async fn upload(&self, local: &Path, remote_path: &str) -> Result<Output>;
}

/// Production `Remote` over the OpenSSH client binaries.
pub struct SshRemote {
    target: SshTarget,
    runner: TokioCommandRunner,
}

impl SshRemote {
    #[must_use]
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            runner: TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
        }
    }

    fn common_options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.target.key_path.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
        ]
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.target.ssh_port.to_string());
        args.push(self.target.destination());
        args.push(command.to_string());
        args
    }
}

impl Remote for SshRemote {
    async fn exec(&self, command: &str) -> Result<Output> {
        let args = self.ssh_args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner
            .run("ssh", &refs)
            .await
            .with_context(|| format!("ssh to {}", self.target.host))
    }

    async fn exec_with_stdin(&self, command: &str, input: &[u8]) -> Result<Output> {
        let args = self.ssh_args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner
            .run_with_stdin("ssh", &refs, input)
            .await
            .with_context(|| format!("ssh to {}", self.target.host))
    }

    async fn upload(&self, local: &Path, remote_path: &str) -> Result<Output> {
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(self.target.ssh_port.to_string());
        args.push(local.display().to_string());
        args.push(format!("{}:{remote_path}", self.target.destination()));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner
            .run_with_timeout("scp", &refs, TRANSFER_TIMEOUT)
            .await
            .with_context(|| format!("scp to {}", self.target.host))
    }
}


#[cfg(test)]
mod proptests {
    use super::shell_quote;
    use proptest::prelude::*;

    proptest! {
        /// Quoted output always starts and ends with a single quote and
        /// never contains a bare (unescaped) quote in between.
        #[test]
        fn prop_shell_quote_is_balanced(s in ".{0,60}") {
            let quoted = shell_quote(&s);
            prop_assert!(quoted.starts_with('\''));
            prop_assert!(quoted.ends_with('\''));
        }

        /// Quoting never loses content: stripping the escape sequences
        /// recovers the original string.
        #[test]
        fn prop_shell_quote_round_trips(s in "[a-zA-Z0-9 ./_'-]{0,40}") {
            let quoted = shell_quote(&s);
            let inner = &quoted[1..quoted.len() - 1];
            let recovered = inner.replace(r"'\''", "'");
            prop_assert_eq!(recovered, s);
        }
    }
}
