//! Typed error enums for packaging and deployment.
//!
//! All error types implement `thiserror::Error` and convert to
//! `anyhow::Error` via the `?` operator. `DeployError` carries the exit
//! code mapping: ordinary failures (including a successful rollback)
//! exit 1, a failed rollback exits 2 so operators and schedulers can
//! tell the two apart.

use relay_common::DeployStage;
use thiserror::Error;

// ── Packaging errors ──────────────────────────────────────────────────────────

/// Errors raised while building the release archive.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("project root not found: {0}")]
    RootNotFound(String),

    #[error("staging failed: {0}")]
    Staging(String),

    #[error("archive creation failed after retry: {0}")]
    Archive(String),
}

// ── Deployment errors ─────────────────────────────────────────────────────────

/// Errors raised by the deploy state machine.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Violated before any remote mutation — nothing to clean up.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Upload or checksum verification failed. The deployment slots were
    /// never touched.
    #[error("upload failed: {0}\n\nNo deployment slots were modified.")]
    Upload(String),

    /// The new release failed to apply or never became healthy, and the
    /// previous release was restored. The service is available on the
    /// old version; the run still counts as failed.
    #[error(
        "deployment failed during {stage}: {reason}\n\n\
         Rolled back — the service is running the previous release."
    )]
    RolledBack { stage: DeployStage, reason: String },

    /// Rollback itself failed. Manual intervention required.
    #[error(
        "deployment failed during {stage}: {reason}\n\n\
         ROLLBACK FAILED: {rollback_reason}\n\
         The service may be down. Manual intervention is required."
    )]
    RollbackFailed {
        stage: DeployStage,
        reason: String,
        rollback_reason: String,
    },
}

impl DeployError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RollbackFailed { .. } => 2,
            _ => 1,
        }
    }

    /// Stable machine-readable code for `--json` error output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Upload(_) => "upload",
            Self::RolledBack { .. } => "rolled_back",
            Self::RollbackFailed { .. } => "rollback_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_failed_exits_2() {
        let err = DeployError::RollbackFailed {
            stage: DeployStage::HealthChecking,
            reason: "health probe window exhausted".to_string(),
            rollback_reason: "restored release also unhealthy".to_string(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn recovered_rollback_exits_1() {
        let err = DeployError::RolledBack {
            stage: DeployStage::Starting,
            reason: "service restart failed".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn precondition_and_upload_exit_1() {
        assert_eq!(
            DeployError::Precondition("missing key file".to_string()).exit_code(),
            1
        );
        assert_eq!(
            DeployError::Upload("connection refused".to_string()).exit_code(),
            1
        );
    }

    #[test]
    fn rollback_failed_message_is_distinct_from_recovered() {
        let recovered = DeployError::RolledBack {
            stage: DeployStage::HealthChecking,
            reason: "probe window exhausted".to_string(),
        }
        .to_string();
        let catastrophic = DeployError::RollbackFailed {
            stage: DeployStage::HealthChecking,
            reason: "probe window exhausted".to_string(),
            rollback_reason: "backup probe failed".to_string(),
        }
        .to_string();
        assert!(recovered.contains("Rolled back"));
        assert!(!recovered.contains("ROLLBACK FAILED"));
        assert!(catastrophic.contains("ROLLBACK FAILED"));
        assert!(catastrophic.contains("Manual intervention"));
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            DeployError::Precondition(String::new()).code(),
            "precondition"
        );
        assert_eq!(DeployError::Upload(String::new()).code(), "upload");
        assert_eq!(
            DeployError::RolledBack {
                stage: DeployStage::Starting,
                reason: String::new(),
            }
            .code(),
            "rolled_back"
        );
        assert_eq!(
            DeployError::RollbackFailed {
                stage: DeployStage::Starting,
                reason: String::new(),
                rollback_reason: String::new(),
            }
            .code(),
            "rollback_failed"
        );
    }

    #[test]
    fn upload_error_mentions_untouched_slots() {
        let msg = DeployError::Upload("checksum mismatch".to_string()).to_string();
        assert!(msg.contains("No deployment slots were modified"));
    }
}
