//! # Checkpoint Store
//!
//! Durable per-table progress so an interrupted run resumes mid-table
//! instead of from zero.
//!
//! ## Table Layout
//! ```text
//! _migration_progress
//! ┌─────────────┬─────────────────────┬─────────────┬────────────────┬─────────────┐
//! │ table_name  │ last_migrated_index │ total_count │ inserted_count │ status      │
//! ├─────────────┼─────────────────────┼─────────────┼────────────────┼─────────────┤
//! │ clients     │                  99 │         100 │            100 │ completed   │
//! │ staff       │                  49 │         120 │             48 │ in_progress │
//! │ appointments│                  -1 │          30 │              0 │ failed      │
//! └─────────────┴─────────────────────┴─────────────┴────────────────┴─────────────┘
//!                                         + updated_at, error_message
//! ```
//!
//! ## Lifecycle
//! Rows are created lazily when a table is first touched, upserted after
//! every committed checkpoint interval, and deleted together by
//! [`CheckpointStore::clear_all`] only after a run with no table-level error.

use sqlx::SqlitePool;
use tracing::{debug, warn};

use tessera_core::convert::{datetime_to_iso, parse_datetime};
use tessera_core::MigrationCheckpoint;

use crate::error::DbResult;

/// Persisted form of a checkpoint.
#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    table_name: String,
    last_migrated_index: i64,
    total_count: i64,
    inserted_count: i64,
    status: String,
    updated_at: String,
    error_message: Option<String>,
}

impl TryFrom<CheckpointRow> for MigrationCheckpoint {
    type Error = crate::error::DbError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        // Rows written by hand (or by older builds) may carry any date format
        let updated_at = parse_datetime(&row.updated_at).unwrap_or_else(chrono::Utc::now);

        Ok(MigrationCheckpoint {
            status: row.status.parse()?,
            table_name: row.table_name,
            last_migrated_index: row.last_migrated_index,
            total_count: row.total_count,
            inserted_count: row.inserted_count,
            updated_at,
            error_message: row.error_message,
        })
    }
}

/// Repository over `_migration_progress`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    /// Creates a new CheckpointStore.
    pub fn new(pool: SqlitePool) -> Self {
        CheckpointStore { pool }
    }

    /// Creates the checkpoint table if it does not exist yet.
    pub async fn ensure_table(&self) -> DbResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migration_progress (
                table_name          TEXT PRIMARY KEY NOT NULL,
                last_migrated_index INTEGER NOT NULL DEFAULT -1,
                total_count         INTEGER NOT NULL DEFAULT 0,
                inserted_count      INTEGER NOT NULL DEFAULT 0,
                status              TEXT NOT NULL DEFAULT 'pending',
                updated_at          TEXT NOT NULL,
                error_message       TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the checkpoint of one table.
    ///
    /// ## Returns
    /// `None` if the table was never touched (or the checkpoint table does not exist).
    pub async fn get(&self, table: &str) -> DbResult<Option<MigrationCheckpoint>> {
        self.ensure_table().await?;

        let row: Option<CheckpointRow> = sqlx::query_as(
            r#"
            SELECT table_name, last_migrated_index, total_count, inserted_count,
                   status, updated_at, error_message
            FROM _migration_progress
            WHERE table_name = ?1
            "#,
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MigrationCheckpoint::try_from).transpose()
    }

    /// Gets every checkpoint, ordered by table name.
    ///
    /// Never fails: a missing table (before the first run) or an unreadable
    /// row yields an empty list or skips the row, with a warning.
    pub async fn get_all(&self) -> Vec<MigrationCheckpoint> {
        let rows: Vec<CheckpointRow> = match sqlx::query_as(
            r#"
            SELECT table_name, last_migrated_index, total_count, inserted_count,
                   status, updated_at, error_message
            FROM _migration_progress
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                debug!(error = %e, "No checkpoints readable");
                return Vec::new();
            }
        };

        rows.into_iter()
            .filter_map(|row| {
                let table = row.table_name.clone();
                match MigrationCheckpoint::try_from(row) {
                    Ok(cp) => Some(cp),
                    Err(e) => {
                        warn!(table = %table, error = %e, "Ignoring unreadable checkpoint");
                        None
                    }
                }
            })
            .collect()
    }

    /// Upserts a checkpoint keyed by table name.
    pub async fn save(&self, checkpoint: &MigrationCheckpoint) -> DbResult<()> {
        debug!(
            table = %checkpoint.table_name,
            status = %checkpoint.status,
            index = checkpoint.last_migrated_index,
            inserted = checkpoint.inserted_count,
            "Saving checkpoint"
        );

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO _migration_progress (
                table_name, last_migrated_index, total_count, inserted_count,
                status, updated_at, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&checkpoint.table_name)
        .bind(checkpoint.last_migrated_index)
        .bind(checkpoint.total_count)
        .bind(checkpoint.inserted_count)
        .bind(checkpoint.status.as_str())
        .bind(datetime_to_iso(checkpoint.updated_at))
        .bind(&checkpoint.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes every checkpoint.
    ///
    /// ## Returns
    /// Number of rows deleted.
    pub async fn clear_all(&self) -> DbResult<u64> {
        self.ensure_table().await?;

        let result = sqlx::query("DELETE FROM _migration_progress")
            .execute(&self.pool)
            .await?;

        debug!(deleted = result.rows_affected(), "Checkpoints cleared");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
