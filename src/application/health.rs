//! Derived sync-health snapshot.
//!
//! A pure read over the last 30 days of run records and the open data
//! gaps, recomputed on every request; nothing here is persisted. The
//! overdue check takes precedence over the failure-ratio check.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::entities::{DataGap, SyncRun, SyncRunStatus};
use crate::infrastructure::extension_repository::ExtensionRepository;

/// Window of run history the snapshot aggregates over.
const WINDOW_DAYS: i64 = 30;

/// A run is overdue once its completion is older than the daily
/// cadence plus a one-hour buffer.
const OVERDUE_HOURS: i64 = 25;

const MAX_OPEN_GAPS: i64 = 100;
const RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSyncSummary {
    pub timestamp: DateTime<Utc>,
    pub status: SyncRunStatus,
    pub success_count: i64,
    pub failed_count: i64,
    pub duration: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetrics {
    pub total_syncs: usize,
    pub successful_syncs: usize,
    pub failed_syncs: usize,
    pub partial_syncs: usize,
    /// Successful / total within the window, one decimal place; 0 when
    /// no runs exist.
    pub success_rate: f64,
    /// Average duration across the window, milliseconds.
    pub avg_duration: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Last24HourCounts {
    pub syncs: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub last_sync: Option<LastSyncSummary>,
    pub sync_overdue: bool,
    pub metrics: WindowMetrics,
    pub last24_hours: Last24HourCounts,
    pub open_gaps: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSummary {
    pub total: usize,
    pub recent: Vec<DataGap>,
}

/// Full `/health` payload: the snapshot plus recent run records and
/// recent open gaps for the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub health: HealthSnapshot,
    pub gaps: GapSummary,
    pub recent_logs: Vec<SyncRun>,
}

pub struct HealthSnapshotBuilder {
    repo: Arc<ExtensionRepository>,
}

impl HealthSnapshotBuilder {
    pub fn new(repo: Arc<ExtensionRepository>) -> Self {
        Self { repo }
    }

    pub async fn build(&self) -> Result<HealthReport> {
        let now = Utc::now();
        let runs = self
            .repo
            .runs_completed_since(now - Duration::days(WINDOW_DAYS))
            .await?;
        let gaps = self.repo.open_gaps(MAX_OPEN_GAPS).await?;

        let health = compute_snapshot(&runs, gaps.len(), now);
        let report = HealthReport {
            health,
            gaps: GapSummary {
                total: gaps.len(),
                recent: gaps.into_iter().take(RECENT_LIMIT).collect(),
            },
            recent_logs: runs.into_iter().take(RECENT_LIMIT).collect(),
        };
        Ok(report)
    }
}

/// Pure snapshot computation over a window of runs (most recent first).
pub fn compute_snapshot(
    runs: &[SyncRun],
    open_gaps: usize,
    now: DateTime<Utc>,
) -> HealthSnapshot {
    let last_sync = runs.first();

    let sync_overdue = match last_sync {
        Some(run) => now - run.completed_at > Duration::hours(OVERDUE_HOURS),
        None => true,
    };

    let total_syncs = runs.len();
    let successful_syncs = count_status(runs, SyncRunStatus::Success);
    let failed_syncs = count_status(runs, SyncRunStatus::Failed);
    let partial_syncs = count_status(runs, SyncRunStatus::Partial);

    // Overdue wins over the failure-ratio check.
    let status = if sync_overdue {
        HealthStatus::Warning
    } else if failed_syncs > successful_syncs {
        HealthStatus::Critical
    } else {
        HealthStatus::Healthy
    };

    let success_rate = if total_syncs > 0 {
        (successful_syncs as f64 / total_syncs as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    let avg_duration = if total_syncs > 0 {
        let sum: i64 = runs.iter().map(|run| run.duration_ms).sum();
        (sum as f64 / total_syncs as f64).round() as i64
    } else {
        0
    };

    let day_ago = now - Duration::hours(24);
    let last_24: Vec<&SyncRun> = runs.iter().filter(|run| run.completed_at >= day_ago).collect();

    HealthSnapshot {
        status,
        last_sync: last_sync.map(|run| LastSyncSummary {
            timestamp: run.completed_at,
            status: run.status,
            success_count: run.success_count,
            failed_count: run.failed_count,
            duration: run.duration_ms,
        }),
        sync_overdue,
        metrics: WindowMetrics {
            total_syncs,
            successful_syncs,
            failed_syncs,
            partial_syncs,
            success_rate,
            avg_duration,
        },
        last24_hours: Last24HourCounts {
            syncs: last_24.len(),
            successful: last_24
                .iter()
                .filter(|run| run.status == SyncRunStatus::Success)
                .count(),
            failed: last_24
                .iter()
                .filter(|run| run.status == SyncRunStatus::Failed)
                .count(),
        },
        open_gaps,
    }
}

fn count_status(runs: &[SyncRun], status: SyncRunStatus) -> usize {
    runs.iter().filter(|run| run.status == status).count()
}
