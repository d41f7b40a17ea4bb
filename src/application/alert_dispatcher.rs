//! Best-effort webhook alerting for degraded sync runs.
//!
//! Fires when a run is `failed`, or `partial` with more failures than
//! successes (both conditions are policy flags, see `AlertPolicy`).
//! Delivery failures are logged and swallowed; alerting never affects
//! the run's recorded status.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::application::sync_orchestrator::SyncOutcome;
use crate::domain::entities::SyncRunStatus;
use crate::infrastructure::config::AlertPolicy;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertPayload {
    pub status: SyncRunStatus,
    pub title: String,
    pub details: AlertDetails,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertDetails {
    pub successful: i64,
    pub failed: i64,
    pub timestamp: String,
    pub errors: Vec<String>,
}

pub struct AlertDispatcher {
    client: reqwest::Client,
    webhook_url: Option<String>,
    policy: AlertPolicy,
}

impl AlertDispatcher {
    pub fn new(webhook_url: Option<String>, policy: AlertPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "failed to configure webhook client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            webhook_url,
            policy,
        }
    }

    /// Whether this outcome warrants an alert under the policy.
    pub fn should_alert(&self, outcome: &SyncOutcome) -> bool {
        match outcome.status {
            SyncRunStatus::Failed => self.policy.alert_on_failed,
            SyncRunStatus::Partial => {
                self.policy.partial_when_failures_exceed_successes
                    && outcome.failure_count > outcome.success_count
            }
            SyncRunStatus::Success => false,
        }
    }

    /// Build the webhook payload: counts, timestamp, and at most the
    /// first `max_errors_in_payload` error strings.
    pub fn build_payload(&self, outcome: &SyncOutcome) -> AlertPayload {
        let title = match outcome.status {
            SyncRunStatus::Failed => "Extension stats sync failed",
            _ => "Extension stats sync partially failed",
        };
        AlertPayload {
            status: outcome.status,
            title: title.to_string(),
            details: AlertDetails {
                successful: outcome.success_count,
                failed: outcome.failure_count,
                timestamp: Utc::now().to_rfc3339(),
                errors: outcome
                    .errors
                    .iter()
                    .take(self.policy.max_errors_in_payload)
                    .cloned()
                    .collect(),
            },
        }
    }

    /// Fire the webhook if the policy says so. Silent no-op when no
    /// endpoint is configured.
    pub async fn maybe_alert(&self, outcome: &SyncOutcome) {
        if !self.should_alert(outcome) {
            return;
        }
        let Some(url) = self.webhook_url.as_deref() else {
            debug!("no webhook URL configured for sync alerts");
            return;
        };

        let payload = self.build_payload(outcome);
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(status = outcome.status.as_str(), "sync alert delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "sync alert rejected by webhook");
            }
            Err(err) => {
                error!(error = %err, "failed to send sync alert");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn outcome(status: SyncRunStatus, success: i64, failed: i64, errors: usize) -> SyncOutcome {
        let now = Utc::now();
        SyncOutcome {
            status,
            total: success + failed,
            success_count: success,
            failure_count: failed,
            errors: (0..errors).map(|i| format!("error {i}")).collect(),
            duration_ms: 1200,
            started_at: now,
            completed_at: now,
        }
    }

    fn dispatcher() -> AlertDispatcher {
        AlertDispatcher::new(None, AlertPolicy::default())
    }

    #[test]
    fn failed_runs_alert() {
        assert!(dispatcher().should_alert(&outcome(SyncRunStatus::Failed, 0, 4, 4)));
    }

    #[test]
    fn partial_alerts_only_when_failures_outnumber_successes() {
        let d = dispatcher();
        assert!(d.should_alert(&outcome(SyncRunStatus::Partial, 1, 3, 3)));
        assert!(!d.should_alert(&outcome(SyncRunStatus::Partial, 3, 1, 1)));
        assert!(!d.should_alert(&outcome(SyncRunStatus::Partial, 2, 2, 2)));
    }

    #[test]
    fn successful_runs_never_alert() {
        assert!(!dispatcher().should_alert(&outcome(SyncRunStatus::Success, 5, 0, 0)));
    }

    #[test]
    fn payload_caps_errors_at_five() {
        let payload = dispatcher().build_payload(&outcome(SyncRunStatus::Failed, 0, 8, 8));
        assert_eq!(payload.details.errors.len(), 5);
        assert_eq!(payload.details.failed, 8);
    }

    #[test]
    fn disabled_policy_suppresses_failed_alerts() {
        let d = AlertDispatcher::new(
            None,
            AlertPolicy {
                alert_on_failed: false,
                ..AlertPolicy::default()
            },
        );
        assert!(!d.should_alert(&outcome(SyncRunStatus::Failed, 0, 4, 4)));
    }
}
