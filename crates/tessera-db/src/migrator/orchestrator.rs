//! # Migration Orchestrator
//!
//! Runs every table in dependency order and aggregates the results.
//!
//! ## Run as a Saga
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ensure _migration_progress ──► load checkpoints (resume detection)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  clients ──► staff ──► services ──► ... ──► devices ──► sync_queue     │
//! │     ok        FAIL        ok                   ok           ok          │
//! │                │                                                        │
//! │                ├─ errors += "staff: ..."                                │
//! │                ├─ success = false                                       │
//! │                └─ checkpoint(staff) = failed, counts kept               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  success? ──yes──► clear_all()      (nothing left to resume)            │
//! │           ──no───► keep checkpoints (next run resumes)                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each table is its own checkpointed unit of work; one table's failure never
//! blocks the tables after it. The order is advisory: nothing checks
//! references at insert time.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tessera_core::{MigrationCheckpoint, MigrationResult, TableMigrationResult, MIGRATION_ORDER};

use crate::config::MigrationSettings;
use crate::error::{DbError, DbResult};
use crate::migrator::table::{elapsed_ms, TableMigrator};
use crate::pool::Database;
use crate::repository::CheckpointStore;
use crate::source::SourceEnumerator;

/// Runs the whole data migration.
#[derive(Debug)]
pub struct MigrationOrchestrator<'s, S> {
    source: &'s S,
    store: CheckpointStore,
    migrator: TableMigrator,
    tables: Vec<String>,
}

impl<'s, S: SourceEnumerator> MigrationOrchestrator<'s, S> {
    /// Creates an orchestrator over [`MIGRATION_ORDER`].
    pub fn new(db: &Database, source: &'s S, settings: &MigrationSettings) -> Self {
        MigrationOrchestrator {
            source,
            store: db.checkpoints(),
            migrator: TableMigrator::new(db, settings.batch_size, settings.checkpoint_interval),
            tables: MIGRATION_ORDER.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Replaces the table list (partial runs, tests).
    pub fn with_tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Tables this orchestrator will run, in order.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Runs every table.
    ///
    /// ## Arguments
    /// * `progress` - `(table, current, total)` record counts, fired after each
    ///   committed batch and once more when the table finishes (`0, 0` if it
    ///   failed)
    ///
    /// ## Returns
    /// * `Ok(result)` - Always, unless the checkpoint table cannot be created;
    ///   table failures are reported in `result.errors`
    pub async fn run<P>(&self, mut progress: P) -> DbResult<MigrationResult>
    where
        P: FnMut(&str, usize, usize),
    {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        self.store.ensure_table().await?;
        let checkpoints: HashMap<String, MigrationCheckpoint> = self
            .store
            .get_all()
            .await
            .into_iter()
            .map(|cp| (cp.table_name.clone(), cp))
            .collect();

        info!(
            run_id = %run_id,
            tables = self.tables.len(),
            checkpoints = checkpoints.len(),
            "Starting data migration"
        );

        let mut result = MigrationResult {
            run_id,
            success: true,
            tables: Vec::with_capacity(self.tables.len()),
            errors: Vec::new(),
            total_records: 0,
            duration_ms: 0,
        };

        for table in &self.tables {
            let table_started = Instant::now();
            let checkpoint = checkpoints.get(table);

            let outcome = self
                .migrator
                .migrate(self.source, table, checkpoint, |done, total| {
                    progress(table, done, total)
                })
                .await;

            match outcome {
                Ok(table_result) => {
                    if table_result.is_short() {
                        warn!(
                            table = %table,
                            dexie = table_result.dexie_count,
                            sqlite = table_result.sqlite_count,
                            "Some records were not migrated"
                        );
                    }
                    result.total_records += table_result.sqlite_count;
                    let count = table_result.dexie_count as usize;
                    progress(table, count, count);
                    result.tables.push(table_result);
                }
                Err(e) => {
                    error!(run_id = %result.run_id, table = %table, error = %e, "Table migration failed");
                    result.success = false;
                    result.errors.push(format!("{}: {}", table, e));
                    self.record_failure(table, checkpoint, &e).await;
                    progress(table, 0, 0);
                    result
                        .tables
                        .push(TableMigrationResult::failed(table.as_str(), elapsed_ms(table_started)));
                }
            }
        }

        if result.success {
            match self.store.clear_all().await {
                Ok(cleared) => debug!(cleared, "All tables migrated, checkpoints cleared"),
                Err(e) => {
                    error!(error = %e, "Cannot clear checkpoints");
                    result.success = false;
                    result.errors.push(format!("checkpoints: {}", e));
                }
            }
        } else {
            warn!(
                failed = result.errors.len(),
                "Migration incomplete, checkpoints kept for resume"
            );
        }

        result.duration_ms = elapsed_ms(started);
        info!(
            run_id = %result.run_id,
            success = result.success,
            total_records = result.total_records,
            duration_ms = result.duration_ms,
            "Data migration finished"
        );

        Ok(result)
    }

    /// Persists a `failed` checkpoint, keeping whatever progress is durable.
    ///
    /// Best effort: a failure here is logged and the run goes on.
    async fn record_failure(&self, table: &str, loaded: Option<&MigrationCheckpoint>, cause: &DbError) {
        let fallback = || loaded.cloned().unwrap_or_else(|| MigrationCheckpoint::new(table));

        let mut cp = match self.store.get(table).await {
            Ok(Some(cp)) => cp,
            Ok(None) => fallback(),
            Err(e) => {
                warn!(table, error = %e, "Cannot read checkpoint of failed table");
                fallback()
            }
        };

        if let Err(e) = cp.fail(cause.to_string()) {
            warn!(table, error = %e, "Checkpoint not marked failed");
            return;
        }

        if let Err(e) = self.store.save(&cp).await {
            warn!(table, error = %e, "Cannot save failed checkpoint");
        }
    }
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
    use tessera_core::{CheckpointStatus, ResumePoint, SkipReason};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn settings() -> MigrationSettings {
        MigrationSettings::default()
    }

    fn records(prefix: &str, n: usize) -> Vec<serde_json::Value> {
        (0..n)
            .map(|i| json!({ "id": format!("{}{}", prefix, i), "createdAt": 1705314600000_i64 }))
            .collect()
    }

    /// Replaces `staff` with a copy whose deferred self-reference can never
    /// be satisfied: every insert succeeds but every COMMIT fails.
    /// A failing INSERT is a record-level error and never fails the table;
    /// only BEGIN/COMMIT failures do.
    async fn break_staff_commits(db: &Database) {
        for sql in [
            "DROP TABLE staff",
            r#"CREATE TABLE staff (
                id          TEXT PRIMARY KEY NOT NULL,
                name        TEXT,
                manager_id  TEXT NOT NULL DEFAULT 'ghost'
                            REFERENCES staff(id) DEFERRABLE INITIALLY DEFERRED,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                sync_status TEXT
            )"#,
        ] {
            sqlx::query(sql).execute(db.pool()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_fresh_run() {
        let db = db().await;
        let source = MemorySource::new()
            .with_table("clients", records("c", 2))
            .with_table("staff", records("s", 1));

        let result = MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["clients", "staff"])
            .run(|_, _, _| {})
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.total_records, 3);
        assert!(result.errors.is_empty());
        assert!(db.checkpoints().get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_full_order_with_absent_tables() {
        let db = db().await;
        let source = MemorySource::new()
            .with_table("clients", records("c", 2))
            .with_table("devices", vec![]);

        let result = MigrationOrchestrator::new(&db, &source, &settings())
            .run(|_, _, _| {})
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.tables.len(), MIGRATION_ORDER.len());

        let names: Vec<_> = result.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, MIGRATION_ORDER.to_vec());

        let staff = result.table("staff").unwrap();
        assert!(staff.skipped);
        assert_eq!(staff.skip_reason, Some(SkipReason::NotInSource));

        let devices = result.table("devices").unwrap();
        assert!(!devices.skipped);
        assert_eq!(devices.sqlite_count, 0);
    }

    #[tokio::test]
    async fn test_forced_table_failure() {
        let db = db().await;
        break_staff_commits(&db).await;

        let source = MemorySource::new()
            .with_table("clients", records("c", 1))
            .with_table("staff", records("s", 1))
            .with_table("appointments", records("a", 1));
        let mut seen = Vec::new();

        let result = MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["clients", "staff", "appointments"])
            .run(|table, done, total| seen.push((table.to_string(), done, total)))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        let staff_calls: Vec<_> = seen.iter().filter(|(t, _, _)| t == "staff").collect();
        assert_eq!(staff_calls.last().map(|(_, d, t)| (*d, *t)), Some((0, 0)));
        assert!(result.errors[0].starts_with("staff: "));

        assert_eq!(result.table("clients").unwrap().sqlite_count, 1);
        assert_eq!(result.table("appointments").unwrap().sqlite_count, 1);
        let staff = result.table("staff").unwrap();
        assert!(!staff.skipped);
        assert_eq!((staff.dexie_count, staff.sqlite_count), (0, 0));

        assert_eq!(db.count_rows("clients").await.unwrap(), 1);
        assert_eq!(db.count_rows("appointments").await.unwrap(), 1);
        assert_eq!(db.count_rows("staff").await.unwrap(), 0);

        let store = db.checkpoints();
        let cp = store.get("staff").await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Failed);
        assert!(cp.error_message.is_some());
        assert_eq!(
            store.get("clients").await.unwrap().unwrap().status,
            CheckpointStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_failed_run_resumes_next_time() {
        let db = db().await;
        break_staff_commits(&db).await;

        let source = MemorySource::new()
            .with_table("clients", records("c", 2))
            .with_table("staff", records("s", 1));
        let orchestrator = MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["clients", "staff"]);

        let first = orchestrator.run(|_, _, _| {}).await.unwrap();
        assert!(!first.success);

        // Repair the destination and run again
        sqlx::query("DROP TABLE staff").execute(db.pool()).await.unwrap();
        sqlx::query(
            "CREATE TABLE staff (id TEXT PRIMARY KEY NOT NULL, created_at TEXT, updated_at TEXT, sync_status TEXT)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let second = orchestrator.run(|_, _, _| {}).await.unwrap();
        assert!(second.success);

        let clients = second.table("clients").unwrap();
        assert_eq!(clients.skip_reason, Some(SkipReason::AlreadyCompleted));
        assert_eq!(second.total_records, 3);
        assert!(db.checkpoints().get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_resume() {
        let db = db().await;
        let store = db.checkpoints();
        store.ensure_table().await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO _migration_progress
                (table_name, last_migrated_index, total_count, inserted_count, status, updated_at)
            VALUES ('clients', 49, 100, 50, 'in_progress', '2024-06-01T08:00:00.000Z')
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let source = MemorySource::new().with_table("clients", records("c", 100));
        let mut seen = Vec::new();

        let result = MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["clients"])
            .run(|table, done, total| seen.push((table.to_string(), done, total)))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.table("clients").unwrap().sqlite_count, 100);
        assert_eq!(result.total_records, 100);

        // Only indices 50..=99 were written by this run
        assert_eq!(db.count_rows("clients").await.unwrap(), 50);
        let earliest: Option<String> =
            sqlx::query_scalar("SELECT id FROM clients WHERE id = 'c49'")
                .fetch_optional(db.pool())
                .await
                .unwrap();
        assert!(earliest.is_none());

        assert_eq!(seen.first(), Some(&("clients".to_string(), 100, 100)));
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let db = db().await;
        let source = MemorySource::new()
            .with_table("clients", records("c", 120))
            .with_table("services", records("v", 7));
        let orchestrator = MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["clients", "services"]);

        let first = orchestrator.run(|_, _, _| {}).await.unwrap();
        let second = orchestrator.run(|_, _, _| {}).await.unwrap();

        assert!(first.success && second.success);
        assert_eq!(first.total_records, second.total_records);
        assert_eq!(db.count_rows("clients").await.unwrap(), 120);
        assert_eq!(db.count_rows("services").await.unwrap(), 7);

        let duplicates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (SELECT id FROM clients GROUP BY id HAVING COUNT(*) > 1)",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(duplicates, 0);
    }

    #[tokio::test]
    async fn test_counts_conserved_without_bad_records() {
        let db = db().await;
        let source = MemorySource::new()
            .with_table("clients", records("c", 250))
            .with_table("products", records("p", 30))
            .with_table("settings", vec![json!({ "key": "theme", "value": "dark" })]);

        let result = MigrationOrchestrator::new(&db, &source, &settings())
            .run(|_, _, _| {})
            .await
            .unwrap();

        for table in result.tables.iter().filter(|t| !t.skipped) {
            assert_eq!(table.dexie_count, table.sqlite_count, "{}", table.name);
        }
        assert_eq!(result.total_records, 281);
    }

    #[tokio::test]
    async fn test_progress_reports_batches_then_completion() {
        let db = db().await;
        let source = MemorySource::new().with_table("clients", records("c", 250));
        let mut seen = Vec::new();

        MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["clients"])
            .run(|_, done, total| seen.push((done, total)))
            .await
            .unwrap();

        assert_eq!(seen, vec![(100, 250), (200, 250), (250, 250), (250, 250)]);
    }

    #[tokio::test]
    async fn test_failure_keeps_prior_progress() {
        let db = db().await;
        break_staff_commits(&db).await;

        let store = db.checkpoints();
        store.ensure_table().await.unwrap();
        let mut cp = MigrationCheckpoint::new("staff");
        cp.begin(300, ResumePoint::default()).unwrap();
        cp.advance(99, 100).unwrap();
        store.save(&cp).await.unwrap();

        let source = MemorySource::new().with_table("staff", records("s", 300));
        let result = MigrationOrchestrator::new(&db, &source, &settings())
            .with_tables(["staff"])
            .run(|_, _, _| {})
            .await
            .unwrap();

        assert!(!result.success);
        let stored = store.get("staff").await.unwrap().unwrap();
        assert_eq!(stored.status, CheckpointStatus::Failed);
        assert_eq!(stored.last_migrated_index, 99);
        assert_eq!(stored.inserted_count, 100);
    }
}
