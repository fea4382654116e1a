//! Deploy state machine — upload, slot swap, service start, health gate,
//! rollback.
//!
//! The run walks `Uploading → BackingUp → Extracting → Starting →
//! HealthChecking → Active`, checkpointing each transition locally.
//! Failures before any slot mutation are fatal and leave the remote
//! untouched; failures after it trigger the rollback path, which
//! restores the backup slot and re-probes it.

pub mod health;
pub mod provision;

use std::path::{Path, PathBuf};

use anyhow::Result;
use relay_common::{DeployStage, DeployState};

use crate::error::DeployError;
use crate::output::OutputContext;
use crate::remote::{Remote, shell_quote};
use crate::state::StateManager;

use health::{HealthProbe, ProbeSettings};

/// Env key written to the runtime credential file in the active slot.
pub const CREDENTIAL_KEY: &str = "GEMINI_API_KEY";

/// File name of the uploaded archive under the remote root.
const REMOTE_ARCHIVE_NAME: &str = "release.tar.gz";

/// Everything the deploy run needs to know about the target.
#[derive(Debug)]
pub struct DeploySettings {
    pub host: String,
    pub user: String,
    pub key_path: PathBuf,
    pub ssh_port: u16,
    /// Port the deployed service listens on (health probe target).
    pub service_port: u16,
    /// Remote directory holding the slots and the uploaded archive.
    pub remote_root: String,
    /// systemd unit name of the service.
    pub unit: String,
    pub domain: Option<String>,
    /// Opaque secret written to the slot's `.env`. Never logged.
    pub credential: Option<String>,
    pub skip_runtime: bool,
    pub skip_proxy: bool,
    pub skip_certs: bool,
    pub probe: ProbeSettings,
}

impl DeploySettings {
    /// Remote directory of the running release.
    #[must_use]
    pub fn active_slot(&self) -> String {
        format!("{}/current", self.remote_root)
    }

    /// Remote directory of the previous release.
    #[must_use]
    pub fn backup_slot(&self) -> String {
        format!("{}/backup", self.remote_root)
    }

    /// Remote path of the uploaded archive.
    #[must_use]
    pub fn remote_archive(&self) -> String {
        format!("{}/{REMOTE_ARCHIVE_NAME}", self.remote_root)
    }

    /// Health endpoint probed to gate the rollout.
    #[must_use]
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.host, self.service_port)
    }
}

// ── Remote command builders ───────────────────────────────────────────────────
//
// Every command is built here so the state-machine tests can match on
// exact strings instead of parsing shell.

fn mkdir_root_command(s: &DeploySettings) -> String {
    format!("mkdir -p {}", shell_quote(&s.remote_root))
}

fn checksum_command(s: &DeploySettings) -> String {
    format!("sha256sum {}", shell_quote(&s.remote_archive()))
}

fn backup_command(s: &DeploySettings) -> String {
    let current = shell_quote(&s.active_slot());
    let backup = shell_quote(&s.backup_slot());
    format!("if [ -d {current} ]; then rm -rf {backup} && mv {current} {backup}; fi")
}

fn extract_command(s: &DeploySettings) -> String {
    let current = shell_quote(&s.active_slot());
    format!(
        "mkdir -p {current} && tar -xzf {archive} -C {current}",
        archive = shell_quote(&s.remote_archive())
    )
}

fn credential_command(s: &DeploySettings) -> String {
    format!(
        "install -m 600 /dev/stdin {}/.env",
        shell_quote(&s.active_slot())
    )
}

fn cleanup_command(s: &DeploySettings) -> String {
    format!("rm -f {}", shell_quote(&s.remote_archive()))
}

fn backup_exists_command(s: &DeploySettings) -> String {
    format!("test -d {}", shell_quote(&s.backup_slot()))
}

fn remove_active_command(s: &DeploySettings) -> String {
    format!("rm -rf {}", shell_quote(&s.active_slot()))
}

fn restore_backup_command(s: &DeploySettings) -> String {
    format!(
        "mv {backup} {current}",
        backup = shell_quote(&s.backup_slot()),
        current = shell_quote(&s.active_slot())
    )
}

// ── Execution helpers ─────────────────────────────────────────────────────────

/// Run a remote command, mapping a non-zero exit to its stderr.
pub(crate) async fn exec_ok(remote: &impl Remote, command: &str) -> Result<(), String> {
    match remote.exec(command).await {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(remote_failure(&out)),
        Err(e) => Err(format!("{e:#}")),
    }
}

/// Run a remote command with piped stdin, mapping failure to stderr.
pub(crate) async fn exec_ok_with_stdin(
    remote: &impl Remote,
    command: &str,
    input: &[u8],
) -> Result<(), String> {
    match remote.exec_with_stdin(command, input).await {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(remote_failure(&out)),
        Err(e) => Err(format!("{e:#}")),
    }
}

fn remote_failure(out: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("remote command failed ({})", out.status)
    } else {
        format!("remote command failed: {stderr}")
    }
}

// ── State machine ─────────────────────────────────────────────────────────────

/// Run the full deploy state machine.
///
/// # Errors
///
/// Returns [`DeployError::Precondition`] or [`DeployError::Upload`]
/// before any slot mutation, [`DeployError::RolledBack`] when a later
/// failure was recovered by restoring the backup slot, and
/// [`DeployError::RollbackFailed`] when the restore itself failed.
#[allow(clippy::too_many_arguments)]
pub async fn run_deploy(
    remote: &impl Remote,
    probe: &impl HealthProbe,
    settings: &DeploySettings,
    local_archive: &Path,
    archive_sha256: &str,
    state_mgr: &StateManager,
    ctx: &OutputContext,
) -> Result<()> {
    preflight(remote, settings, local_archive).await?;

    let mut state = DeployState::begin(settings.host.as_str(), Some(archive_sha256.to_string()));
    state_mgr.save(&state)?;

    ctx.stage(DeployStage::Uploading.description());
    upload_archive(remote, settings, local_archive, archive_sha256)
        .await
        .map_err(DeployError::Upload)?;
    if let Err(e) = std::fs::remove_file(local_archive) {
        ctx.warn(&format!("could not remove local archive: {e}"));
    }

    match apply_stages(remote, probe, settings, state_mgr, &mut state, ctx).await {
        Ok(()) => {
            let _ = remote.exec(&cleanup_command(settings)).await;
            state_mgr.advance(&mut state, DeployStage::Active)?;
            ctx.success(&format!(
                "Deployment active on {} (release {}).",
                settings.host,
                &archive_sha256[..12.min(archive_sha256.len())]
            ));
            Ok(())
        }
        Err((stage, reason)) => {
            ctx.error(&format!("{}: {reason}", stage.description()));
            state_mgr.advance(&mut state, DeployStage::RollingBack)?;
            ctx.stage(DeployStage::RollingBack.description());
            let rollback = roll_back(remote, probe, settings).await;
            state_mgr.advance(&mut state, DeployStage::Failed)?;
            match rollback {
                Ok(()) => {
                    ctx.warn("Previous release restored and healthy.");
                    Err(DeployError::RolledBack { stage, reason }.into())
                }
                Err(rollback_reason) => Err(DeployError::RollbackFailed {
                    stage,
                    reason,
                    rollback_reason,
                }
                .into()),
            }
        }
    }
}

/// Fatal checks before any remote mutation.
async fn preflight(
    remote: &impl Remote,
    settings: &DeploySettings,
    local_archive: &Path,
) -> Result<(), DeployError> {
    if !settings.key_path.is_file() {
        return Err(DeployError::Precondition(format!(
            "SSH key not found: {}",
            settings.key_path.display()
        )));
    }
    if settings.credential.as_deref().is_none_or(str::is_empty) {
        return Err(DeployError::Precondition(format!(
            "missing service credential: pass --api-key or set {CREDENTIAL_KEY}"
        )));
    }
    if !local_archive.is_file() {
        return Err(DeployError::Precondition(format!(
            "archive not found: {}",
            local_archive.display()
        )));
    }
    exec_ok(remote, "true")
        .await
        .map_err(|e| DeployError::Precondition(format!("{} unreachable: {e}", settings.host)))
}

/// Transfer the archive and verify the remote checksum.
async fn upload_archive(
    remote: &impl Remote,
    settings: &DeploySettings,
    local_archive: &Path,
    expected_sha256: &str,
) -> Result<(), String> {
    exec_ok(remote, &mkdir_root_command(settings)).await?;

    match remote.upload(local_archive, &settings.remote_archive()).await {
        Ok(out) if out.status.success() => {}
        Ok(out) => return Err(remote_failure(&out)),
        Err(e) => return Err(format!("{e:#}")),
    }

    let out = remote
        .exec(&checksum_command(settings))
        .await
        .map_err(|e| format!("{e:#}"))?;
    if !out.status.success() {
        return Err(remote_failure(&out));
    }
    let stdout = String::from_utf8_lossy(&out.stdout);
    let actual = stdout.split_whitespace().next().unwrap_or_default();
    if actual == expected_sha256 {
        Ok(())
    } else {
        Err(format!(
            "checksum mismatch after transfer (expected {expected_sha256}, got {actual})"
        ))
    }
}

/// The slot-mutating stages. An error names the stage that failed.
async fn apply_stages(
    remote: &impl Remote,
    probe: &impl HealthProbe,
    settings: &DeploySettings,
    state_mgr: &StateManager,
    state: &mut DeployState,
    ctx: &OutputContext,
) -> Result<(), (DeployStage, String)> {
    let checkpoint = |state: &mut DeployState, stage: DeployStage| {
        ctx.stage(stage.description());
        state_mgr
            .advance(state, stage)
            .map_err(|e| (stage, format!("{e:#}")))
    };

    checkpoint(state, DeployStage::BackingUp)?;
    exec_ok(remote, &backup_command(settings))
        .await
        .map_err(|e| (DeployStage::BackingUp, e))?;

    checkpoint(state, DeployStage::Extracting)?;
    exec_ok(remote, &extract_command(settings))
        .await
        .map_err(|e| (DeployStage::Extracting, e))?;
    let env_line = format!(
        "{CREDENTIAL_KEY}={}\n",
        settings.credential.as_deref().unwrap_or_default()
    );
    exec_ok_with_stdin(remote, &credential_command(settings), env_line.as_bytes())
        .await
        .map_err(|e| (DeployStage::Extracting, e))?;

    checkpoint(state, DeployStage::Starting)?;
    provision::run(remote, settings, ctx)
        .await
        .map_err(|e| (DeployStage::Starting, e))?;

    checkpoint(state, DeployStage::HealthChecking)?;
    probe
        .wait_healthy(&settings.health_url(), ctx.quiet)
        .map_err(|e| (DeployStage::HealthChecking, e))?;

    Ok(())
}

/// Restore the backup slot and verify it still serves.
async fn roll_back(
    remote: &impl Remote,
    probe: &impl HealthProbe,
    settings: &DeploySettings,
) -> Result<(), String> {
    // Best effort — the unit may never have started.
    let _ = remote.exec(&provision::stop_command(settings)).await;

    exec_ok(remote, &remove_active_command(settings))
        .await
        .map_err(|e| format!("removing failed slot: {e}"))?;

    let has_backup = match remote.exec(&backup_exists_command(settings)).await {
        Ok(out) => out.status.success(),
        Err(e) => return Err(format!("{e:#}")),
    };
    if !has_backup {
        return Err("no backup slot to restore".to_string());
    }

    exec_ok(remote, &restore_backup_command(settings))
        .await
        .map_err(|e| format!("restoring backup slot: {e}"))?;
    exec_ok(remote, &provision::restart_command(settings))
        .await
        .map_err(|e| format!("restarting restored release: {e}"))?;
    probe
        .wait_healthy(&settings.health_url(), true)
        .map_err(|reason| format!("restored release failed its health probe: {reason}"))
}

// ── Test fixtures ─────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) fn test_settings() -> DeploySettings {
    DeploySettings {
        host: "203.0.113.10".to_string(),
        user: "ubuntu".to_string(),
        key_path: PathBuf::from("/nonexistent/deploy.pem"),
        ssh_port: 22,
        service_port: 8000,
        remote_root: "/opt/outfit-api".to_string(),
        unit: "outfit-api".to_string(),
        domain: None,
        credential: Some("test-credential".to_string()),
        skip_runtime: true,
        skip_proxy: true,
        skip_certs: true,
        probe: ProbeSettings {
            attempts: 1,
            delay: std::time::Duration::from_millis(1),
        },
    }
}
