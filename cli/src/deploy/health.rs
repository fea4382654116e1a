//! Health probing — the bounded-retry HTTP check that gates the
//! success/rollback decision.

use std::time::Duration;

use crate::output::progress;

/// Per-request timeout for a single probe attempt.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry window for the probe: fixed attempts, fixed inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Health status of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// The endpoint answered but not with 200.
    Unhealthy { reason: String },
    /// Transport failure — connection refused, timeout. Counts as a
    /// failed attempt, never as a fatal abort.
    Unknown,
}

/// Probe the endpoint once.
#[must_use]
pub fn check(url: &str) -> HealthStatus {
    match ureq::get(url).timeout(PROBE_TIMEOUT).call() {
        Ok(resp) if resp.status() == 200 => HealthStatus::Healthy,
        Ok(resp) => HealthStatus::Unhealthy {
            reason: format!("HTTP {}", resp.status()),
        },
        Err(ureq::Error::Status(code, _)) => HealthStatus::Unhealthy {
            reason: format!("HTTP {code}"),
        },
        Err(_) => HealthStatus::Unknown,
    }
}

/// Health gate abstraction so the deploy state machine can be driven by
/// test doubles.
pub trait HealthProbe {
    /// Wait until the endpoint reports healthy, or return the reason the
    /// window was exhausted.
    ///
    /// # Errors
    ///
    /// Returns the last observed failure reason when no attempt in the
    /// window succeeded.
    fn wait_healthy(&self, url: &str, quiet: bool) -> Result<(), String>;
}

/// Production probe over HTTP.
pub struct HttpProbe {
    pub settings: ProbeSettings,
}

impl HealthProbe for HttpProbe {
    fn wait_healthy(&self, url: &str, quiet: bool) -> Result<(), String> {
        let pb = (!quiet).then(|| progress::spinner(&format!("probing {url}")));
        let mut last_reason = "no probe attempts configured".to_string();

        for attempt in 1..=self.settings.attempts {
            match check(url) {
                HealthStatus::Healthy => {
                    if let Some(pb) = pb {
                        progress::finish_ok(&pb, "service is healthy");
                    }
                    return Ok(());
                }
                HealthStatus::Unhealthy { reason } => last_reason = reason,
                HealthStatus::Unknown => last_reason = "endpoint unreachable".to_string(),
            }
            if attempt < self.settings.attempts {
                std::thread::sleep(self.settings.delay);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        Err(format!(
            "not healthy after {} attempts: {last_reason}",
            self.settings.attempts
        ))
    }
}
