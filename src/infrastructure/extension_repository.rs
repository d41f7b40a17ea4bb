//! Repository for tracked extensions, install stats, sync logs, and
//! data gaps.
//!
//! All store access for the sync subsystem goes through this type;
//! rows are converted into domain structs here and never cross the
//! boundary untyped.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::entities::{
    DataGap, ExtensionMetrics, InstallStatPoint, SyncRun, SyncRunStatus, SyncTrigger,
    TrackedExtension,
};

#[derive(Clone)]
pub struct ExtensionRepository {
    pool: Arc<SqlitePool>,
}

impl ExtensionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    // ===============================
    // TRACKED EXTENSIONS
    // ===============================

    /// All tracked extensions, oldest first. This is the sync universe.
    pub async fn list_extensions(&self) -> Result<Vec<TrackedExtension>> {
        let rows = sqlx::query(
            r#"
            SELECT id, extension_id, publisher_name, extension_name, display_name,
                   marketplace_url, icon_url, average_rating, rating_count,
                   download_count, last_updated, current_version, created_at, updated_at
            FROM extensions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| Self::extension_from_row(&row)).collect())
    }

    pub async fn get_extension(&self, id: &str) -> Result<Option<TrackedExtension>> {
        let row = sqlx::query(
            r#"
            SELECT id, extension_id, publisher_name, extension_name, display_name,
                   marketplace_url, icon_url, average_rating, rating_count,
                   download_count, last_updated, current_version, created_at, updated_at
            FROM extensions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|row| Self::extension_from_row(&row)))
    }

    /// Register an extension for tracking. Used by the external CRUD
    /// surface and by tests; the sync subsystem itself never adds rows.
    pub async fn insert_extension(&self, extension: &TrackedExtension) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO extensions
            (id, extension_id, publisher_name, extension_name, display_name,
             marketplace_url, icon_url, average_rating, rating_count,
             download_count, last_updated, current_version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&extension.id)
        .bind(&extension.extension_id)
        .bind(&extension.publisher_name)
        .bind(&extension.extension_name)
        .bind(&extension.display_name)
        .bind(&extension.marketplace_url)
        .bind(&extension.icon_url)
        .bind(extension.average_rating)
        .bind(extension.rating_count)
        .bind(extension.download_count)
        .bind(&extension.last_updated)
        .bind(&extension.current_version)
        .bind(extension.created_at)
        .bind(extension.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite the cached metadata fields from a fresh upstream fetch.
    pub async fn update_metrics(
        &self,
        extension_id: &str,
        metrics: &ExtensionMetrics,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE extensions
            SET average_rating = ?, rating_count = ?, download_count = ?,
                last_updated = ?, current_version = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(metrics.average_rating)
        .bind(metrics.rating_count)
        .bind(metrics.download_count)
        .bind(&metrics.last_updated)
        .bind(&metrics.current_version)
        .bind(now)
        .bind(extension_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    // ===============================
    // INSTALL STAT SERIES
    // ===============================

    /// Idempotency gate query: does the extension already have a point
    /// recorded at or after `since`?
    pub async fn has_stat_since(&self, extension_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM install_stats WHERE extension_id = ? AND recorded_at >= ? LIMIT 1",
        )
        .bind(extension_id)
        .bind(since)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Most recently recorded install count, if any.
    pub async fn latest_install_count(&self, extension_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT install_count FROM install_stats
            WHERE extension_id = ?
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(extension_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|row| row.get("install_count")))
    }

    /// Append one point to the series.
    pub async fn insert_install_stat(
        &self,
        extension_id: &str,
        install_count: i64,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO install_stats (id, extension_id, install_count, recorded_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(extension_id)
        .bind(install_count)
        .bind(recorded_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Full series for one extension, ascending by recorded_at. Test
    /// and dashboard support.
    pub async fn install_stat_series(&self, extension_id: &str) -> Result<Vec<InstallStatPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT id, extension_id, install_count, recorded_at
            FROM install_stats
            WHERE extension_id = ?
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(extension_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InstallStatPoint {
                id: row.get("id"),
                extension_id: row.get("extension_id"),
                install_count: row.get("install_count"),
                recorded_at: row.get("recorded_at"),
            })
            .collect())
    }

    /// Just the install counts of the series, in recorded order.
    pub async fn install_counts(&self, extension_id: &str) -> Result<Vec<i64>> {
        let series = self.install_stat_series(extension_id).await?;
        Ok(series.into_iter().map(|point| point.install_count).collect())
    }

    // ===============================
    // SYNC RUN LOG
    // ===============================

    pub async fn insert_sync_run(&self, run: &SyncRun) -> Result<()> {
        let errors_json = match &run.errors {
            Some(errors) if !errors.is_empty() => Some(serde_json::to_string(errors)?),
            _ => None,
        };

        sqlx::query(
            r#"
            INSERT INTO sync_logs
            (id, status, total_extensions, success_count, failed_count,
             errors, duration_ms, triggered_by, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(run.status.as_str())
        .bind(run.total_extensions)
        .bind(run.success_count)
        .bind(run.failed_count)
        .bind(errors_json)
        .bind(run.duration_ms)
        .bind(run.triggered_by.as_str())
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Runs completed at or after `since`, most recent first.
    pub async fn runs_completed_since(&self, since: DateTime<Utc>) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, total_extensions, success_count, failed_count,
                   errors, duration_ms, triggered_by, started_at, completed_at
            FROM sync_logs
            WHERE completed_at >= ?
            ORDER BY completed_at DESC
            "#,
        )
        .bind(since)
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(Self::sync_run_from_row).collect()
    }

    // ===============================
    // DATA GAPS
    // ===============================

    /// Store-side gap computation: for every extension, each calendar
    /// day from its first recorded point through yesterday that has no
    /// point at all. Days are bucketed in the same fixed offset the
    /// idempotency gate uses, applied as a date modifier.
    pub async fn find_missing_days(&self, offset_minutes: i32) -> Result<Vec<(String, NaiveDate)>> {
        let day_shift = format!("{offset_minutes} minutes");
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE bounds AS (
                SELECT extension_id, date(MIN(recorded_at), ?1) AS first_day
                FROM install_stats
                GROUP BY extension_id
            ),
            days(extension_id, day) AS (
                SELECT extension_id, first_day FROM bounds
                UNION ALL
                SELECT extension_id, date(day, '+1 day') FROM days
                WHERE day < date('now', ?1, '-1 day')
            )
            SELECT d.extension_id, d.day
            FROM days d
            LEFT JOIN install_stats s
                ON s.extension_id = d.extension_id AND date(s.recorded_at, ?1) = d.day
            WHERE s.extension_id IS NULL
            ORDER BY d.extension_id, d.day
            "#,
        )
        .bind(&day_shift)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("extension_id"), row.get("day")))
            .collect())
    }

    /// Upsert detected gaps. A conflicting row only has `detected`
    /// refreshed; an operator-set `backfilled` flag survives.
    pub async fn upsert_gaps(&self, gaps: &[(String, NaiveDate)]) -> Result<()> {
        for (extension_id, gap_date) in gaps {
            sqlx::query(
                r#"
                INSERT INTO data_gaps (extension_id, gap_date, detected, backfilled)
                VALUES (?, ?, 1, 0)
                ON CONFLICT (extension_id, gap_date) DO UPDATE SET detected = 1
                "#,
            )
            .bind(extension_id)
            .bind(gap_date)
            .execute(&*self.pool)
            .await?;
        }
        Ok(())
    }

    /// Most recent open (not backfilled) gaps.
    pub async fn open_gaps(&self, limit: i64) -> Result<Vec<DataGap>> {
        let rows = sqlx::query(
            r#"
            SELECT extension_id, gap_date, detected, backfilled
            FROM data_gaps
            WHERE backfilled = 0
            ORDER BY gap_date DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DataGap {
                extension_id: row.get("extension_id"),
                gap_date: row.get("gap_date"),
                detected: row.get("detected"),
                backfilled: row.get("backfilled"),
            })
            .collect())
    }

    /// Mark a gap as backfilled. Operator/backfill-tooling entry point.
    pub async fn mark_gap_backfilled(
        &self,
        extension_id: &str,
        gap_date: NaiveDate,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE data_gaps SET backfilled = 1 WHERE extension_id = ? AND gap_date = ?",
        )
        .bind(extension_id)
        .bind(gap_date)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    // ===============================
    // ROW MAPPING
    // ===============================

    fn extension_from_row(row: &sqlx::sqlite::SqliteRow) -> TrackedExtension {
        TrackedExtension {
            id: row.get("id"),
            extension_id: row.get("extension_id"),
            publisher_name: row.get("publisher_name"),
            extension_name: row.get("extension_name"),
            display_name: row.get("display_name"),
            marketplace_url: row.get("marketplace_url"),
            icon_url: row.get("icon_url"),
            average_rating: row.get("average_rating"),
            rating_count: row.get("rating_count"),
            download_count: row.get("download_count"),
            last_updated: row.get("last_updated"),
            current_version: row.get("current_version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn sync_run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncRun> {
        let status_raw: String = row.get("status");
        let status = SyncRunStatus::parse(&status_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown sync status in store: {status_raw}"))?;

        let trigger_raw: String = row.get("triggered_by");
        let triggered_by = SyncTrigger::parse(&trigger_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown sync trigger in store: {trigger_raw}"))?;

        let errors: Option<Vec<String>> = match row.get::<Option<String>, _>("errors") {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(SyncRun {
            id: row.get("id"),
            status,
            total_extensions: row.get("total_extensions"),
            success_count: row.get("success_count"),
            failed_count: row.get("failed_count"),
            errors,
            duration_ms: row.get("duration_ms"),
            triggered_by,
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}
