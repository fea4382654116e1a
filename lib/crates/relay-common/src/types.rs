use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a deploy run.
///
/// The happy path walks `Uploading → BackingUp → Extracting → Starting →
/// HealthChecking → Active`. `RollingBack` and `Failed` are only entered
/// when a stage after the upload fails; a run visits each stage at most
/// once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStage {
    Uploading,
    BackingUp,
    Extracting,
    Starting,
    HealthChecking,
    Active,
    RollingBack,
    Failed,
}

impl DeployStage {
    /// Next stage on the happy path. Terminal and failure stages have none.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Uploading => Some(Self::BackingUp),
            Self::BackingUp => Some(Self::Extracting),
            Self::Extracting => Some(Self::Starting),
            Self::Starting => Some(Self::HealthChecking),
            Self::HealthChecking => Some(Self::Active),
            Self::Active | Self::RollingBack | Self::Failed => None,
        }
    }

    /// Short human-readable description used in progress reporting.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Uploading => "Uploading release archive",
            Self::BackingUp => "Backing up current deployment",
            Self::Extracting => "Extracting new release",
            Self::Starting => "Starting service",
            Self::HealthChecking => "Waiting for service health",
            Self::Active => "Deployment active",
            Self::RollingBack => "Rolling back to previous release",
            Self::Failed => "Deployment failed",
        }
    }
}

impl std::fmt::Display for DeployStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uploading => "uploading",
            Self::BackingUp => "backing_up",
            Self::Extracting => "extracting",
            Self::Starting => "starting",
            Self::HealthChecking => "health_checking",
            Self::Active => "active",
            Self::RollingBack => "rolling_back",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Checkpoint record of the most recent deploy run, persisted locally
/// after every stage transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployState {
    pub stage: DeployStage,
    pub host: String,
    /// Hex SHA-256 of the archive that was (or is being) deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_sha256: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl DeployState {
    /// Fresh state at the start of a run.
    #[must_use]
    pub fn begin(host: impl Into<String>, archive_sha256: Option<String>) -> Self {
        Self {
            stage: DeployStage::Uploading,
            host: host.into(),
            archive_sha256,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn deploy_stage_serde_round_trip() {
        let variants = [
            (DeployStage::Uploading, "\"uploading\""),
            (DeployStage::BackingUp, "\"backing_up\""),
            (DeployStage::Extracting, "\"extracting\""),
            (DeployStage::Starting, "\"starting\""),
            (DeployStage::HealthChecking, "\"health_checking\""),
            (DeployStage::Active, "\"active\""),
            (DeployStage::RollingBack, "\"rolling_back\""),
            (DeployStage::Failed, "\"failed\""),
        ];
        for (variant, expected_json) in &variants {
            let json = serde_json::to_string(variant).expect("serialize");
            assert_eq!(&json, expected_json);
            let back: DeployStage = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(&back, variant);
        }
    }

    #[test]
    fn deploy_stage_happy_path_ends_at_active() {
        let mut stage = DeployStage::Uploading;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            visited.push(stage);
        }
        assert_eq!(stage, DeployStage::Active);
        assert_eq!(visited.len(), 6, "happy path visits six stages");
    }

    #[test]
    fn deploy_stage_terminal_stages_have_no_next() {
        assert!(DeployStage::Active.next().is_none());
        assert!(DeployStage::RollingBack.next().is_none());
        assert!(DeployStage::Failed.next().is_none());
    }

    #[test]
    fn deploy_stage_display_matches_serde_name() {
        let json = serde_json::to_string(&DeployStage::HealthChecking).expect("serialize");
        assert_eq!(json, format!("\"{}\"", DeployStage::HealthChecking));
    }

    #[test]
    fn deploy_state_round_trip_preserves_fields() {
        let state = DeployState {
            stage: DeployStage::Extracting,
            host: "203.0.113.10".to_string(),
            archive_sha256: Some("ab".repeat(32)),
            started_at: Utc::now(),
        };
        let json = serde_json::to_string(&state).expect("serialize");
        let back: DeployState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.stage, state.stage);
        assert_eq!(back.host, state.host);
        assert_eq!(back.archive_sha256, state.archive_sha256);
        assert_eq!(back.started_at, state.started_at);
    }

    #[test]
    fn deploy_state_missing_archive_digest_deserializes_as_none() {
        let json = r#"{"stage":"active","host":"deploy.example.com","started_at":"2026-08-01T12:00:00Z"}"#;
        let state: DeployState = serde_json::from_str(json).expect("deserialize");
        assert!(state.archive_sha256.is_none());
    }

    #[test]
    fn deploy_state_begin_starts_at_uploading() {
        let state = DeployState::begin("203.0.113.10", None);
        assert_eq!(state.stage, DeployStage::Uploading);
        assert_eq!(state.host, "203.0.113.10");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_stage() -> impl Strategy<Value = DeployStage> {
        prop_oneof![
            Just(DeployStage::Uploading),
            Just(DeployStage::BackingUp),
            Just(DeployStage::Extracting),
            Just(DeployStage::Starting),
            Just(DeployStage::HealthChecking),
            Just(DeployStage::Active),
            Just(DeployStage::RollingBack),
            Just(DeployStage::Failed),
        ]
    }

    proptest! {
        /// Every stage survives a serde round trip.
        #[test]
        fn prop_stage_serde_round_trip(stage in arb_stage()) {
            let json = serde_json::to_string(&stage).expect("serialize");
            let back: DeployStage = serde_json::from_str(&json).expect("deserialize");
            prop_assert_eq!(back, stage);
        }

        /// next() never cycles: walking from any stage terminates within
        /// the number of stages.
        #[test]
        fn prop_stage_next_terminates(start in arb_stage()) {
            let mut stage = start;
            let mut steps = 0;
            while let Some(next) = stage.next() {
                stage = next;
                steps += 1;
                prop_assert!(steps <= 8, "next() must not cycle");
            }
            prop_assert!(stage.next().is_none());
        }

        /// DeployState::begin records the host verbatim.
        #[test]
        fn prop_state_begin_records_host(host in "[a-z0-9.-]{1,40}") {
            let state = DeployState::begin(host.clone(), None);
            prop_assert_eq!(state.host, host);
        }
    }
}
