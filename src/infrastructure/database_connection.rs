// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file and parent directory if they don't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_extensions_sql = r#"
            CREATE TABLE IF NOT EXISTS extensions (
                id TEXT PRIMARY KEY,
                extension_id TEXT NOT NULL UNIQUE,
                publisher_name TEXT NOT NULL,
                extension_name TEXT NOT NULL,
                display_name TEXT NOT NULL,
                marketplace_url TEXT NOT NULL,
                icon_url TEXT,
                average_rating REAL,
                rating_count INTEGER,
                download_count INTEGER,
                last_updated TEXT,
                current_version TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_install_stats_sql = r#"
            CREATE TABLE IF NOT EXISTS install_stats (
                id TEXT PRIMARY KEY,
                extension_id TEXT NOT NULL,
                install_count INTEGER NOT NULL,
                recorded_at DATETIME NOT NULL,
                FOREIGN KEY (extension_id) REFERENCES extensions (id) ON DELETE CASCADE
            )
        "#;

        let create_sync_logs_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_logs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                total_extensions INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                errors TEXT,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                triggered_by TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                completed_at DATETIME NOT NULL
            )
        "#;

        let create_data_gaps_sql = r#"
            CREATE TABLE IF NOT EXISTS data_gaps (
                extension_id TEXT NOT NULL,
                gap_date DATE NOT NULL,
                detected BOOLEAN NOT NULL DEFAULT 1,
                backfilled BOOLEAN NOT NULL DEFAULT 0,
                PRIMARY KEY (extension_id, gap_date)
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_install_stats_ext_recorded
                ON install_stats (extension_id, recorded_at);
            CREATE INDEX IF NOT EXISTS idx_sync_logs_completed_at
                ON sync_logs (completed_at);
            CREATE INDEX IF NOT EXISTS idx_data_gaps_backfilled
                ON data_gaps (backfilled);
        "#;

        sqlx::query(create_extensions_sql).execute(&self.pool).await?;
        sqlx::query(create_install_stats_sql).execute(&self.pool).await?;
        sqlx::query(create_sync_logs_sql).execute(&self.pool).await?;
        sqlx::query(create_data_gaps_sql).execute(&self.pool).await?;
        for statement in create_indexes_sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
