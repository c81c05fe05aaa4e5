//! # Table Migrator
//!
//! Migrates one named table end-to-end: asks the planner what to do, drives
//! the batch inserter, and keeps the table's checkpoint current.
//!
//! ## Checkpoint Writes for One Table
//! ```text
//!   preflight ──skip──► (no write)
//!       │
//!   count = 0 ───────► completed { last = -1, inserted = 0 }
//!       │
//!   Copy(resume)
//!       │
//!       ├─► in_progress { last = start - 1, inserted = baseline }   (before any insert)
//!       ├─► in_progress { last = k, inserted = baseline + n }       (every interval)
//!       └─► completed   { last, inserted = baseline + new }         (end of table)
//! ```
//! A `failed` checkpoint is written by the orchestrator, which sees the error.

use std::time::Instant;
use tracing::{debug, info};

use tessera_core::plan::{plan_copy, preflight, TableAction, TableFacts};
use tessera_core::{MigrationCheckpoint, ResumePoint, TableMigrationResult};

use crate::error::{DbError, DbResult};
use crate::migrator::batch::BatchInserter;
use crate::pool::Database;
use crate::repository::CheckpointStore;
use crate::source::SourceEnumerator;

/// Migrates single tables.
#[derive(Debug, Clone)]
pub struct TableMigrator {
    db: Database,
    store: CheckpointStore,
    inserter: BatchInserter,
}

impl TableMigrator {
    /// Creates a table migrator.
    pub fn new(db: &Database, batch_size: usize, checkpoint_interval: usize) -> Self {
        TableMigrator {
            db: db.clone(),
            store: db.checkpoints(),
            inserter: BatchInserter::new(db.pool().clone(), batch_size, checkpoint_interval),
        }
    }

    /// Migrates one table.
    ///
    /// ## Arguments
    /// * `source` - Legacy store
    /// * `table` - Table name (same in source and destination)
    /// * `checkpoint` - The table's checkpoint as loaded at the start of the run
    /// * `on_progress` - `(processed, total)` after every committed batch
    ///
    /// ## Returns
    /// * `Ok(result)` - Migrated (possibly with skipped records) or skipped
    /// * `Err(_)` - Table-level failure; checkpoint progress up to the last
    ///   interval is durable
    pub async fn migrate<S, P>(
        &self,
        source: &S,
        table: &str,
        checkpoint: Option<&MigrationCheckpoint>,
        on_progress: P,
    ) -> DbResult<TableMigrationResult>
    where
        S: SourceEnumerator,
        P: FnMut(usize, usize),
    {
        let started = Instant::now();

        let facts = TableFacts {
            source_present: source.has_table(table).await,
            destination_present: self.db.table_exists(table).await?,
            checkpoint,
        };

        if let Some(skip) = preflight(facts) {
            info!(table, reason = %skip.reason, "Skipping table");
            return Ok(TableMigrationResult::skipped(
                table,
                skip.reason,
                skip.dexie_count,
                skip.sqlite_count,
                elapsed_ms(started),
            ));
        }

        let count = source.count(table).await?;

        let resume = match plan_copy(checkpoint, count) {
            TableAction::CompleteEmpty => {
                let mut cp = MigrationCheckpoint::new(table);
                cp.complete(-1, 0)?;
                self.store.save(&cp).await?;

                info!(table, "Source table is empty");
                return Ok(TableMigrationResult::migrated(table, 0, 0, elapsed_ms(started)));
            }
            TableAction::Copy(resume) => resume,
        };

        self.copy(source, table, checkpoint, resume, on_progress, started)
            .await
    }

    async fn copy<S, P>(
        &self,
        source: &S,
        table: &str,
        checkpoint: Option<&MigrationCheckpoint>,
        resume: ResumePoint,
        on_progress: P,
        started: Instant,
    ) -> DbResult<TableMigrationResult>
    where
        S: SourceEnumerator,
        P: FnMut(usize, usize),
    {
        let records = source.to_array(table).await?;
        let total = records.len();
        let schema = self.db.table_schema(table).await?;

        let mut cp = checkpoint
            .cloned()
            .unwrap_or_else(|| MigrationCheckpoint::new(table));
        cp.begin(total as i64, resume)?;
        self.store.save(&cp).await?;

        // Clamped by begin() when the source shrank since the last run
        let baseline = cp.inserted_count;

        if resume.start_index > 0 {
            info!(
                table,
                start = resume.start_index,
                baseline,
                total,
                "Resuming table"
            );
        } else {
            info!(table, total, "Migrating table");
        }

        let store = &self.store;
        let checkpoint_cp = &mut cp;
        let outcome = self
            .inserter
            .insert(
                &schema,
                &records,
                resume.start_index,
                on_progress,
                move |last_index, inserted| {
                    let advanced = checkpoint_cp.advance(last_index, baseline + inserted as i64);
                    let snapshot = checkpoint_cp.clone();
                    async move {
                        match advanced {
                            Ok(()) => store.save(&snapshot).await,
                            Err(e) => Err(DbError::from(e)),
                        }
                    }
                },
            )
            .await?;

        let inserted = baseline + outcome.inserted_count as i64;
        let last_index = if outcome.last_index >= 0 {
            outcome.last_index
        } else {
            cp.last_migrated_index
        };
        cp.complete(last_index, inserted)?;
        self.store.save(&cp).await?;

        debug!(
            table,
            new = outcome.inserted_count,
            inserted = cp.inserted_count,
            "Table checkpoint completed"
        );

        Ok(TableMigrationResult::migrated(
            table,
            total as u64,
            cp.inserted_count.max(0) as u64,
            elapsed_ms(started),
        ))
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::source::MemorySource;
    use serde_json::json;
    use tessera_core::{CheckpointStatus, SkipReason};

    async fn setup() -> (Database, TableMigrator) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.checkpoints().ensure_table().await.unwrap();
        let migrator = TableMigrator::new(&db, 100, 100);
        (db, migrator)
    }

    fn clients(n: usize) -> Vec<serde_json::Value> {
        (0..n).map(|i| json!({ "id": format!("c{}", i) })).collect()
    }

    #[tokio::test]
    async fn test_absent_source_table_is_skipped() {
        let (db, migrator) = setup().await;
        let source = MemorySource::new();

        let result = migrator.migrate(&source, "clients", None, |_, _| {}).await.unwrap();
        assert!(result.skipped);
        assert_eq!(result.skip_reason, Some(SkipReason::NotInSource));
        assert!(db.checkpoints().get("clients").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_destination_is_skipped() {
        let (_db, migrator) = setup().await;
        let source = MemorySource::new().with_table("loyalty_cards", clients(2));

        let result = migrator
            .migrate(&source, "loyalty_cards", None, |_, _| {})
            .await
            .unwrap();
        assert_eq!(result.skip_reason, Some(SkipReason::DestinationMissing));
    }

    #[tokio::test]
    async fn test_empty_table_completes_without_skip() {
        let (db, migrator) = setup().await;
        let source = MemorySource::new().with_table("staff", vec![]);

        let result = migrator.migrate(&source, "staff", None, |_, _| {}).await.unwrap();
        assert!(!result.skipped);
        assert_eq!(result.sqlite_count, 0);

        let cp = db.checkpoints().get("staff").await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Completed);
        assert_eq!(cp.last_migrated_index, -1);
        assert_eq!(cp.inserted_count, 0);
    }

    #[tokio::test]
    async fn test_fresh_copy_completes_checkpoint() {
        let (db, migrator) = setup().await;
        let source = MemorySource::new().with_table("clients", clients(3));
        let mut seen = Vec::new();

        let result = migrator
            .migrate(&source, "clients", None, |done, total| seen.push((done, total)))
            .await
            .unwrap();

        assert_eq!(result.dexie_count, 3);
        assert_eq!(result.sqlite_count, 3);
        assert_eq!(seen, vec![(3, 3)]);

        let cp = db.checkpoints().get("clients").await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Completed);
        assert_eq!(cp.last_migrated_index, 2);
        assert_eq!(cp.inserted_count, 3);
    }

    #[tokio::test]
    async fn test_rejected_insert_still_completes_table() {
        let (db, migrator) = setup().await;
        sqlx::query(
            "CREATE TRIGGER reject_c1 BEFORE INSERT ON clients WHEN NEW.id = 'c1' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let source = MemorySource::new().with_table("clients", clients(3));

        let result = migrator.migrate(&source, "clients", None, |_, _| {}).await.unwrap();

        assert_eq!(result.dexie_count, 3);
        assert_eq!(result.sqlite_count, 2);
        assert!(result.is_short());
        assert_eq!(db.count_rows("clients").await.unwrap(), 2);

        let cp = db.checkpoints().get("clients").await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Completed);
        assert_eq!(cp.last_migrated_index, 2);
        assert_eq!(cp.inserted_count, 2);
    }

    #[tokio::test]
    async fn test_completed_checkpoint_reports_stored_counts() {
        let (_db, migrator) = setup().await;
        let source = MemorySource::new().with_table("clients", clients(3));

        let mut cp = MigrationCheckpoint::new("clients");
        cp.begin(7, ResumePoint::default()).unwrap();
        cp.complete(6, 6).unwrap();

        let result = migrator
            .migrate(&source, "clients", Some(&cp), |_, _| {})
            .await
            .unwrap();
        assert_eq!(result.skip_reason, Some(SkipReason::AlreadyCompleted));
        assert_eq!(result.dexie_count, 7);
        assert_eq!(result.sqlite_count, 6);
    }

    #[tokio::test]
    async fn test_failed_checkpoint_resumes_with_carried_count() {
        let (db, migrator) = setup().await;
        let source = MemorySource::new().with_table("clients", clients(10));

        let mut cp = MigrationCheckpoint::new("clients");
        cp.begin(10, ResumePoint::default()).unwrap();
        cp.advance(3, 4).unwrap();
        cp.fail("disk full").unwrap();

        let result = migrator
            .migrate(&source, "clients", Some(&cp), |_, _| {})
            .await
            .unwrap();

        assert_eq!(result.sqlite_count, 10);
        assert_eq!(db.count_rows("clients").await.unwrap(), 6);

        let stored = db.checkpoints().get("clients").await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::Completed);
        assert_eq!(stored.error_message, None);
    }

    #[tokio::test]
    async fn test_resume_past_end_of_shrunken_source() {
        let (db, migrator) = setup().await;
        let source = MemorySource::new().with_table("clients", clients(5));

        let mut cp = MigrationCheckpoint::new("clients");
        cp.begin(20, ResumePoint::default()).unwrap();
        cp.advance(9, 10).unwrap();

        let result = migrator
            .migrate(&source, "clients", Some(&cp), |_, _| {})
            .await
            .unwrap();

        assert_eq!(result.dexie_count, 5);
        assert_eq!(result.sqlite_count, 5);
        assert_eq!(db.count_rows("clients").await.unwrap(), 0);

        let stored = db.checkpoints().get("clients").await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::Completed);
        assert_eq!(stored.last_migrated_index, 4);
    }
}
