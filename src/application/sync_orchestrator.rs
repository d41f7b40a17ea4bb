//! Sync orchestrator.
//!
//! Iterates all tracked extensions strictly sequentially, applying the
//! idempotency gate, the marketplace fetch, and the monotonicity guard
//! per item, then classifies the aggregate, writes the immutable run
//! record, runs gap detection, and hands the classification to the
//! alert dispatcher. Per-item failures are recorded as strings and
//! never stop the loop; only a universe-fetch failure aborts the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::alert_dispatcher::AlertDispatcher;
use crate::application::gap_detector::GapDetector;
use crate::domain::entities::{SyncRun, SyncRunStatus, SyncTrigger, TrackedExtension};
use crate::domain::errors::SyncError;
use crate::domain::services::MetricsProvider;
use crate::infrastructure::config::{start_of_day, AppConfig};
use crate::infrastructure::extension_repository::ExtensionRepository;

/// Aggregate result of one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub status: SyncRunStatus,
    pub total: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub errors: Vec<String>,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

pub struct SyncOrchestrator {
    repo: Arc<ExtensionRepository>,
    provider: Arc<dyn MetricsProvider>,
    gap_detector: GapDetector,
    alerts: AlertDispatcher,
    item_delay: Duration,
    day_boundary: FixedOffset,
}

impl SyncOrchestrator {
    pub fn new(
        repo: Arc<ExtensionRepository>,
        provider: Arc<dyn MetricsProvider>,
        gap_detector: GapDetector,
        alerts: AlertDispatcher,
        config: &AppConfig,
    ) -> Self {
        Self {
            repo,
            provider,
            gap_detector,
            alerts,
            item_delay: Duration::from_millis(config.sync.item_delay_ms),
            day_boundary: config.day_boundary_offset(),
        }
    }

    /// Run one full sync across all tracked extensions.
    ///
    /// Returns `Err` only on a top-level abort (the universe of tracked
    /// extensions could not be loaded); that abort is still recorded as
    /// a `failed` run before propagating.
    pub async fn run_sync(&self, trigger: SyncTrigger) -> Result<SyncOutcome, SyncError> {
        let started_at = Utc::now();
        info!(triggered_by = trigger.as_str(), "starting stats sync");

        let universe = match self.repo.list_extensions().await {
            Ok(extensions) => extensions,
            Err(err) => {
                let message = format!("failed to load tracked extensions: {err}");
                error!(error = %err, "sync aborted before per-item work");
                let _ = self
                    .finish_run(trigger, started_at, 0, 0, 1, vec![message], true)
                    .await;
                return Err(SyncError::UniverseFetch(err.to_string()));
            }
        };

        let total = universe.len() as i64;
        let mut success_count: i64 = 0;
        let mut failure_count: i64 = 0;
        let mut errors: Vec<String> = Vec::new();

        for extension in &universe {
            match self.sync_one(extension).await {
                Ok(()) => success_count += 1,
                Err(message) => {
                    warn!(extension = %extension.extension_id, error = %message, "extension sync failed");
                    errors.push(message);
                    failure_count += 1;
                }
            }
            // Throttle request rate toward the marketplace.
            tokio::time::sleep(self.item_delay).await;
        }

        let outcome = self
            .finish_run(
                trigger,
                started_at,
                total,
                success_count,
                failure_count,
                errors,
                false,
            )
            .await;

        info!(
            status = outcome.status.as_str(),
            total = outcome.total,
            synced = outcome.success_count,
            failed = outcome.failure_count,
            duration_ms = outcome.duration_ms,
            "stats sync completed"
        );
        Ok(outcome)
    }

    /// Process one extension. `Err` carries the per-item error string
    /// recorded in the run's error list.
    async fn sync_one(&self, extension: &TrackedExtension) -> Result<(), String> {
        // Idempotency gate: a second run on the same day must not
        // re-hit the marketplace once today's point exists. A gate
        // read failure fails closed (we attempt the fetch).
        let window_start = start_of_day(Utc::now(), self.day_boundary);
        match self.repo.has_stat_since(&extension.id, window_start).await {
            Ok(true) => {
                debug!(extension = %extension.extension_id, "today's data already recorded, skipping fetch");
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => {
                warn!(extension = %extension.extension_id, error = %err, "idempotency check failed, attempting fetch");
            }
        }

        let metrics = self
            .provider
            .fetch_metrics(&extension.extension_id)
            .await
            .map_err(|err| format!("{}: {}", extension.extension_id, err))?;

        let now = Utc::now();

        // Metadata is refreshed unconditionally on every successful fetch.
        self.repo
            .update_metrics(&extension.id, &metrics, now)
            .await
            .map_err(|err| {
                format!("failed to update extension {}: {}", extension.extension_id, err)
            })?;

        let Some(candidate) = metrics.install_count else {
            return Err(format!(
                "no install stats found for {}",
                extension.extension_id
            ));
        };

        // Monotonicity guard: the marketplace occasionally reports a
        // transient lower count; discarding it keeps the series
        // non-decreasing. A discarded point still counts as a success
        // because the metadata was refreshed.
        let should_append = match self.repo.latest_install_count(&extension.id).await {
            Ok(Some(latest)) => candidate > latest,
            Ok(None) => true,
            Err(err) => {
                warn!(extension = %extension.extension_id, error = %err, "latest-count lookup failed, appending anyway");
                true
            }
        };

        if should_append {
            self.repo
                .insert_install_stat(&extension.id, candidate, now)
                .await
                .map_err(|err| {
                    format!("failed to save stats for {}: {}", extension.extension_id, err)
                })?;
            info!(extension = %extension.extension_id, install_count = candidate, "recorded new install count");
        } else {
            debug!(extension = %extension.extension_id, install_count = candidate, "skipped non-increasing install count");
        }

        Ok(())
    }

    /// Classify, write the run record, detect gaps, and dispatch
    /// alerts. Everything after classification is best-effort.
    async fn finish_run(
        &self,
        trigger: SyncTrigger,
        started_at: DateTime<Utc>,
        total: i64,
        success_count: i64,
        failure_count: i64,
        errors: Vec<String>,
        aborted: bool,
    ) -> SyncOutcome {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();
        let status = classify(total, success_count, failure_count, aborted);

        let run = SyncRun {
            id: Uuid::new_v4().to_string(),
            status,
            total_extensions: total,
            success_count,
            failed_count: failure_count,
            errors: if errors.is_empty() {
                None
            } else {
                Some(errors.clone())
            },
            duration_ms,
            triggered_by: trigger,
            started_at,
            completed_at,
        };

        // A run-log write failure must not mask the run's own outcome.
        if let Err(err) = self.repo.insert_sync_run(&run).await {
            error!(error = %err, "failed to write sync run record");
        }

        // Gap detection runs after every invocation and never fails
        // the enclosing run.
        match self.gap_detector.detect_and_record().await {
            Ok(0) => {}
            Ok(count) => info!(count, "recorded data gaps"),
            Err(err) => warn!(error = %err, "gap detection failed"),
        }

        let outcome = SyncOutcome {
            status,
            total,
            success_count,
            failure_count,
            errors,
            duration_ms,
            started_at,
            completed_at,
        };

        self.alerts.maybe_alert(&outcome).await;

        outcome
    }
}

/// Run classification.
///
/// `failed` when nothing succeeded against a non-empty universe (or on
/// a top-level abort); `partial` when successes and failures mix;
/// `success` otherwise, including the empty universe.
pub fn classify(
    total: i64,
    success_count: i64,
    failure_count: i64,
    aborted: bool,
) -> SyncRunStatus {
    if aborted || (success_count == 0 && total > 0) {
        SyncRunStatus::Failed
    } else if success_count > 0 && failure_count > 0 {
        SyncRunStatus::Partial
    } else {
        SyncRunStatus::Success
    }
}
