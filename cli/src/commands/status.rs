//! `relay status` — report the remote slot layout, service unit state,
//! live health, and the last local deploy checkpoint.

use anyhow::Result;
use clap::Args;

use crate::commands::{ConnectionArgs, resolve_connection};
use crate::config;
use crate::deploy::DeploySettings;
use crate::deploy::health::{self, HealthStatus};
use crate::output::OutputContext;
use crate::remote::{Remote, SshRemote, SshTarget, shell_quote};
use crate::state::StateManager;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Snapshot of the remote deployment layout.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoteStatus {
    pub active_slot: bool,
    pub backup_slot: bool,
    /// `systemctl is-active` output (`active`, `inactive`, `failed`,
    /// or `unknown` when the query itself failed).
    pub unit_state: String,
}

fn slot_exists_command(slot: &str) -> String {
    format!("test -d {}", shell_quote(slot))
}

fn unit_state_command(unit: &str) -> String {
    format!("systemctl is-active {}", shell_quote(unit))
}

/// Query slot presence and unit state over ssh.
///
/// # Errors
///
/// Returns an error only when ssh itself cannot run; a stopped or
/// missing unit is reported in the snapshot, not as an error.
pub async fn query_slots(remote: &impl Remote, settings: &DeploySettings) -> Result<RemoteStatus> {
    let active = remote
        .exec(&slot_exists_command(&settings.active_slot()))
        .await?
        .status
        .success();
    let backup = remote
        .exec(&slot_exists_command(&settings.backup_slot()))
        .await?
        .status
        .success();
    let unit_state = match remote.exec(&unit_state_command(&settings.unit)).await {
        Ok(out) => {
            let state = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if state.is_empty() {
                "unknown".to_string()
            } else {
                state
            }
        }
        Err(_) => "unknown".to_string(),
    };
    Ok(RemoteStatus {
        active_slot: active,
        backup_slot: backup,
        unit_state,
    })
}

fn health_display(status: &HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Unhealthy { reason } => format!("unhealthy ({reason})"),
        HealthStatus::Unknown => "unreachable".to_string(),
    }
}

fn slot_display(present: bool) -> &'static str {
    if present { "present" } else { "absent" }
}

/// Run `relay status`.
///
/// # Errors
///
/// Returns an error when the connection cannot be resolved or ssh fails.
pub async fn run(ctx: &OutputContext, args: &StatusArgs, json: bool) -> Result<()> {
    let file = config::load(&config::config_path()?)?;
    let settings = resolve_connection(&args.connection, &file.defaults)?;

    let remote = SshRemote::new(SshTarget {
        host: settings.host.clone(),
        user: settings.user.clone(),
        key_path: settings.key_path.clone(),
        ssh_port: settings.ssh_port,
    });

    let remote_status = query_slots(&remote, &settings).await?;
    let health = health::check(&settings.health_url());
    let last_run = StateManager::new()?.load()?;

    if json {
        let last = last_run.map(|s| {
            serde_json::json!({
                "stage": s.stage,
                "host": s.host,
                "sha256": s.archive_sha256,
                "started_at": s.started_at,
            })
        });
        println!(
            "{}",
            serde_json::json!({
                "host": settings.host,
                "active_slot": remote_status.active_slot,
                "backup_slot": remote_status.backup_slot,
                "unit": remote_status.unit_state,
                "health": health_display(&health),
                "last_run": last,
            })
        );
        return Ok(());
    }

    ctx.header(&format!("Deployment on {}", settings.host));
    ctx.kv("Active slot", slot_display(remote_status.active_slot));
    ctx.kv("Backup slot", slot_display(remote_status.backup_slot));
    ctx.kv("Service", &remote_status.unit_state);
    ctx.kv("Health", &health_display(&health));
    if let Some(state) = last_run {
        ctx.kv(
            "Last run",
            &format!("{} ({})", state.stage, state.started_at.to_rfc3339()),
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::deploy::test_settings;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Output;
    use std::sync::Mutex;

    struct CannedRemote {
        active: bool,
        backup: bool,
        unit_stdout: &'static str,
        log: Mutex<Vec<String>>,
    }

    impl Remote for CannedRemote {
        async fn exec(&self, command: &str) -> anyhow::Result<Output> {
            self.log.lock().unwrap().push(command.to_string());
            let s = test_settings();
            let (code, stdout) = if command == slot_exists_command(&s.active_slot()) {
                (i32::from(!self.active), "")
            } else if command == slot_exists_command(&s.backup_slot()) {
                (i32::from(!self.backup), "")
            } else if command == unit_state_command(&s.unit) {
                (0, self.unit_stdout)
            } else {
                (1, "")
            };
            Ok(Output {
                status: std::process::ExitStatus::from_raw(code << 8),
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            })
        }

        async fn exec_with_stdin(&self, _: &str, _: &[u8]) -> anyhow::Result<Output> {
            anyhow::bail!("not used")
        }

        async fn upload(&self, _: &std::path::Path, _: &str) -> anyhow::Result<Output> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn query_reports_both_slots_and_unit_state() {
        let remote = CannedRemote {
            active: true,
            backup: false,
            unit_stdout: "active\n",
            log: Mutex::new(Vec::new()),
        };
        let status = query_slots(&remote, &test_settings()).await.expect("query");
        assert_eq!(
            status,
            RemoteStatus {
                active_slot: true,
                backup_slot: false,
                unit_state: "active".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn query_reports_empty_unit_output_as_unknown() {
        let remote = CannedRemote {
            active: false,
            backup: false,
            unit_stdout: "",
            log: Mutex::new(Vec::new()),
        };
        let status = query_slots(&remote, &test_settings()).await.expect("query");
        assert!(!status.active_slot);
        assert_eq!(status.unit_state, "unknown");
    }

    #[test]
    fn slot_commands_quote_paths() {
        assert_eq!(
            slot_exists_command("/opt/outfit-api/current"),
            "test -d '/opt/outfit-api/current'"
        );
        assert_eq!(
            unit_state_command("outfit-api"),
            "systemctl is-active 'outfit-api'"
        );
    }

    #[test]
    fn health_display_covers_all_variants() {
        assert_eq!(health_display(&HealthStatus::Healthy), "healthy");
        assert_eq!(
            health_display(&HealthStatus::Unhealthy {
                reason: "HTTP 503".to_string()
            }),
            "unhealthy (HTTP 503)"
        );
        assert_eq!(health_display(&HealthStatus::Unknown), "unreachable");
    }
}
