//! # Migration Status Tracker
//!
//! The singleton "has the one-time data migration ever completed on this
//! device" flag, checked on every start before the orchestrator is invoked.
//!
//! ## Fail-Open
//! ```text
//! get_status()
//!    │
//!    ├── row present            → stored status
//!    ├── no row                 → default (completed = false)
//!    └── any error              → default (completed = false)  ← re-run
//! ```
//! A redundant re-run is harmless (every insert is an upsert); skipping a
//! needed run is not. Read errors therefore never propagate.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use tessera_core::convert::{datetime_to_iso, parse_datetime};
use tessera_core::MigrationStatus;

use crate::error::DbResult;

/// Fixed key of the singleton row.
const STATUS_ROW_ID: i64 = 1;

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    completed: i64,
    version: i64,
    migrated_at: Option<String>,
    total_records: i64,
    duration_ms: i64,
}

impl From<StatusRow> for MigrationStatus {
    fn from(row: StatusRow) -> Self {
        MigrationStatus {
            completed: row.completed == 1,
            version: row.version,
            migrated_at: row.migrated_at.as_deref().and_then(parse_datetime),
            total_records: row.total_records,
            duration_ms: row.duration_ms,
        }
    }
}

/// Repository over `_data_migration_status`.
#[derive(Debug, Clone)]
pub struct MigrationStatusTracker {
    pool: SqlitePool,
    current_version: i64,
}

impl MigrationStatusTracker {
    /// Creates a tracker that compares stored status against `current_version`.
    pub fn new(pool: SqlitePool, current_version: i64) -> Self {
        MigrationStatusTracker {
            pool,
            current_version,
        }
    }

    /// The data format version this build produces.
    pub fn current_version(&self) -> i64 {
        self.current_version
    }

    async fn ensure_table(&self) -> DbResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _data_migration_status (
                id            INTEGER PRIMARY KEY CHECK (id = 1),
                completed     INTEGER NOT NULL DEFAULT 0,
                version       INTEGER NOT NULL DEFAULT 0,
                migrated_at   TEXT,
                total_records INTEGER NOT NULL DEFAULT 0,
                duration_ms   INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_status(&self) -> DbResult<Option<MigrationStatus>> {
        self.ensure_table().await?;

        let row: Option<StatusRow> = sqlx::query_as(
            r#"
            SELECT completed, version, migrated_at, total_records, duration_ms
            FROM _data_migration_status
            WHERE id = ?1
            "#,
        )
        .bind(STATUS_ROW_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MigrationStatus::from))
    }

    /// Reads the status row, creating the table on first use.
    ///
    /// Any error yields the default (not completed) status.
    pub async fn get_status(&self) -> MigrationStatus {
        match self.read_status().await {
            Ok(status) => status.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Cannot read migration status, assuming not completed");
                MigrationStatus::default()
            }
        }
    }

    /// Records a completed migration.
    ///
    /// ## Arguments
    /// * `version` - Data format version the run produced
    /// * `total_records` - Rows in SQLite across all tables
    /// * `duration_ms` - Wall time of the run
    pub async fn set_complete(&self, version: i64, total_records: i64, duration_ms: i64) -> DbResult<()> {
        self.ensure_table().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO _data_migration_status (
                id, completed, version, migrated_at, total_records, duration_ms
            ) VALUES (?1, 1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(STATUS_ROW_ID)
        .bind(version)
        .bind(datetime_to_iso(Utc::now()))
        .bind(total_records)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;

        info!(version, total_records, duration_ms, "Data migration marked complete");
        Ok(())
    }

    /// Returns true if the migration has completed (at any version).
    pub async fn is_complete(&self) -> bool {
        self.get_status().await.completed
    }

    /// Returns true if the orchestrator must run on this start.
    pub async fn should_run(&self) -> bool {
        self.get_status().await.should_run(self.current_version)
    }

    /// Forgets the completed status (debug tool).
    ///
    /// Rows already migrated stay in place; a re-run overwrites them.
    pub async fn reset(&self) -> DbResult<()> {
        self.ensure_table().await?;

        sqlx::query("DELETE FROM _data_migration_status")
            .execute(&self.pool)
            .await?;

        warn!("Data migration status reset");
        Ok(())
    }
}
