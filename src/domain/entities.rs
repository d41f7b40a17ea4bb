//! Domain entities
//!
//! Rows never cross the repository boundary untyped; these are the
//! structs they are mapped into.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A marketplace extension whose metrics are tracked.
///
/// Latest known metrics are mutated in place by every successful fetch.
/// Deletion is handled outside the sync subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedExtension {
    pub id: String,
    /// External catalog identifier, `publisher.name`.
    pub extension_id: String,
    pub publisher_name: String,
    pub extension_name: String,
    pub display_name: String,
    pub marketplace_url: String,
    pub icon_url: Option<String>,
    pub average_rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub download_count: Option<i64>,
    /// Last-updated timestamp as reported by the marketplace.
    pub last_updated: Option<String>,
    pub current_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metrics extracted from one marketplace query response.
///
/// Absence of an individual statistic is not an error, only a `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMetrics {
    pub install_count: Option<i64>,
    pub average_rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub download_count: Option<i64>,
    pub last_updated: Option<String>,
    pub current_version: Option<String>,
}

/// One point of the append-only install-count series.
///
/// Per extension the series is non-decreasing by `recorded_at`; the
/// monotonicity guard enforces this at write time, not the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallStatPoint {
    pub id: String,
    pub extension_id: String,
    pub install_count: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome classification of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Success,
    Partial,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// What caused a sync run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
    Fallback,
}

impl SyncTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Immutable record of one orchestrator invocation, including zero-item
/// and top-level-failure invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: String,
    pub status: SyncRunStatus,
    pub total_extensions: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub errors: Option<Vec<String>>,
    pub duration_ms: i64,
    pub triggered_by: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// A calendar day with no recorded install-stat point for an extension.
///
/// Keyed by (`extension_id`, `gap_date`); detection must never clear an
/// existing `backfilled` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataGap {
    pub extension_id: String,
    pub gap_date: NaiveDate,
    pub detected: bool,
    pub backfilled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SyncRunStatus::Success,
            SyncRunStatus::Partial,
            SyncRunStatus::Failed,
        ] {
            assert_eq!(SyncRunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncRunStatus::parse("unknown"), None);
    }

    #[test]
    fn trigger_round_trips_through_str() {
        for trigger in [
            SyncTrigger::Scheduled,
            SyncTrigger::Manual,
            SyncTrigger::Fallback,
        ] {
            assert_eq!(SyncTrigger::parse(trigger.as_str()), Some(trigger));
        }
    }
}
