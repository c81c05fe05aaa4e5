//! # Batch Inserter
//!
//! Converts and writes a slice of legacy records, one transaction per batch,
//! isolating per-record failures.
//!
//! ## Batch Loop
//! ```text
//! records:  [ 0 ........ 49 | 50 ....... 149 | 150 ...... 249 | 250 .. 279 ]
//!                 (done)    ▲ start_index
//!                           │
//!             ┌─────────────┴──────┐  ┌──────────────────┐  ┌──────────────┐
//!             │ BEGIN              │  │ BEGIN            │  │ BEGIN        │
//!             │ INSERT OR REPLACE  │  │ ...              │  │ ...          │
//!             │   x100 (bad rows   │  │                  │  │              │
//!             │   warn + skip)     │  │                  │  │              │
//!             │ COMMIT             │  │ COMMIT           │  │ COMMIT       │
//!             └─────────┬──────────┘  └────────┬─────────┘  └──────┬───────┘
//!                       ▼                      ▼                   ▼
//!                  on_progress            on_progress         on_progress
//!                  on_checkpoint(149)     on_checkpoint(249)  on_checkpoint(279)
//! ```
//!
//! ## Failure Severities
//! - conversion or `INSERT` error → record-level: logged, skipped, the index
//!   still counts as attempted
//! - `BEGIN` / `COMMIT` error → table-level: returned to the caller
//!
//! Checkpoints are only written after `COMMIT`, when no transaction holds the
//! connection. A crash between the two re-processes at most one checkpoint
//! interval, which is harmless because every insert is an upsert.

use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{SqliteConnection, SqlitePool};
use std::future::Future;
use tracing::{debug, warn};

use tessera_core::row::convert_record;
use tessera_core::{Record, SqlValue, TableSchema};

use crate::error::{DbError, DbResult};
use crate::pool::quote_identifier;

/// What one `insert` call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows written by this call (not counting earlier runs).
    pub inserted_count: u64,
    /// Last source index attempted, or -1 if nothing was attempted.
    pub last_index: i64,
}

impl BatchOutcome {
    /// Nothing attempted.
    pub const EMPTY: BatchOutcome = BatchOutcome {
        inserted_count: 0,
        last_index: -1,
    };
}

/// Writes legacy records into one destination table.
#[derive(Debug, Clone)]
pub struct BatchInserter {
    pool: SqlitePool,
    batch_size: usize,
    checkpoint_interval: usize,
}

impl BatchInserter {
    /// Creates an inserter.
    ///
    /// ## Arguments
    /// * `batch_size` - Records per transaction (at least 1)
    /// * `checkpoint_interval` - Attempted records between checkpoint callbacks
    pub fn new(pool: SqlitePool, batch_size: usize, checkpoint_interval: usize) -> Self {
        BatchInserter {
            pool,
            batch_size: batch_size.max(1),
            checkpoint_interval: checkpoint_interval.max(1),
        }
    }

    /// Inserts `records[start_index..]` into `schema.table`.
    ///
    /// ## Arguments
    /// * `schema` - Destination columns (drives value conversion)
    /// * `records` - Every record of the source table
    /// * `start_index` - First index to process
    /// * `on_progress` - `(processed, total)` after each committed batch
    /// * `on_checkpoint` - `(last_index, inserted_so_far)` at least once per
    ///   checkpoint interval and after the final batch; an error aborts the table
    ///
    /// ## Returns
    /// [`BatchOutcome::EMPTY`] without touching the database when there is
    /// nothing at or after `start_index`.
    pub async fn insert<P, C, Fut>(
        &self,
        schema: &TableSchema,
        records: &[Record],
        start_index: usize,
        mut on_progress: P,
        mut on_checkpoint: C,
    ) -> DbResult<BatchOutcome>
    where
        P: FnMut(usize, usize),
        C: FnMut(i64, u64) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        let total = records.len();
        if start_index >= total {
            return Ok(BatchOutcome::EMPTY);
        }

        let table = schema.table.as_str();
        let mut outcome = BatchOutcome::EMPTY;
        let mut since_checkpoint = 0usize;

        for batch_start in (start_index..total).step_by(self.batch_size) {
            let batch_end = (batch_start + self.batch_size).min(total);
            let now = Utc::now();

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

            let mut batch_inserted = 0u64;
            for (index, record) in records[batch_start..batch_end].iter().enumerate() {
                let index = batch_start + index;
                match insert_record(&mut tx, schema, record, now).await {
                    Ok(()) => batch_inserted += 1,
                    Err(e) => warn!(table, index, error = %e, "Skipping record"),
                }
            }

            tx.commit()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

            outcome.inserted_count += batch_inserted;
            outcome.last_index = (batch_end - 1) as i64;
            since_checkpoint += batch_end - batch_start;

            debug!(
                table,
                index = outcome.last_index,
                inserted = batch_inserted,
                "Batch committed"
            );
            on_progress(batch_end, total);

            if since_checkpoint >= self.checkpoint_interval || batch_end == total {
                on_checkpoint(outcome.last_index, outcome.inserted_count).await?;
                since_checkpoint = 0;
            }
        }

        Ok(outcome)
    }
}

/// Converts and upserts one record.
async fn insert_record(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    record: &Record,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let row = convert_record(schema, record, now)?;

    if !row.dropped_fields.is_empty() {
        debug!(table = %schema.table, fields = ?row.dropped_fields, "Dropping fields without a column");
    }

    let columns: Vec<String> = row.columns.iter().map(|c| quote_identifier(c)).collect();
    let placeholders: Vec<String> = (1..=row.columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_identifier(&schema.table),
        columns.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for value in &row.values {
        query = bind_value(query, value);
    }
    query.execute(conn).await?;

    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(i) => query.bind(*i),
        SqlValue::Real(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.as_str()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn setup(batch_size: usize, interval: usize) -> (Database, BatchInserter, TableSchema) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let inserter = BatchInserter::new(db.pool().clone(), batch_size, interval);
        let schema = db.table_schema("clients").await.unwrap();
        (db, inserter, schema)
    }

    fn clients(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| json!({ "id": format!("c{}", i), "firstName": format!("Client {}", i) }))
            .collect()
    }

    type Calls = Arc<Mutex<Vec<(i64, u64)>>>;

    fn recorder(calls: &Calls) -> impl FnMut(i64, u64) -> std::future::Ready<DbResult<()>> {
        let calls = calls.clone();
        move |index, inserted| {
            calls.lock().unwrap().push((index, inserted));
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_empty_input_touches_nothing() {
        let (db, inserter, schema) = setup(100, 100).await;
        let calls = Calls::default();

        // A closed pool proves no connection is acquired
        db.close().await;
        let outcome = inserter
            .insert(&schema, &[], 0, |_, _| {}, recorder(&calls))
            .await
            .unwrap();

        assert_eq!(outcome, BatchOutcome::EMPTY);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inserts_from_start_index() {
        let (db, inserter, schema) = setup(100, 100).await;
        let calls = Calls::default();

        let outcome = inserter
            .insert(&schema, &clients(10), 4, |_, _| {}, recorder(&calls))
            .await
            .unwrap();

        assert_eq!(outcome.inserted_count, 6);
        assert_eq!(outcome.last_index, 9);
        assert_eq!(db.count_rows("clients").await.unwrap(), 6);
        assert_eq!(*calls.lock().unwrap(), vec![(9, 6)]);

        let first: Option<String> = sqlx::query_scalar("SELECT id FROM clients WHERE id = 'c3'")
            .fetch_optional(db.pool())
            .await
            .unwrap();
        assert!(first.is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_cadence_and_final_call() {
        let (_db, inserter, schema) = setup(10, 20).await;
        let calls = Calls::default();
        let mut progress = Vec::new();

        inserter
            .insert(
                &schema,
                &clients(45),
                0,
                |done, total| progress.push((done, total)),
                recorder(&calls),
            )
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![(19, 20), (39, 40), (44, 45)]);
        assert_eq!(progress.len(), 5);
        assert_eq!(progress.last(), Some(&(45, 45)));
    }

    #[tokio::test]
    async fn test_bad_records_are_skipped_but_attempted() {
        let (db, inserter, schema) = setup(100, 100).await;
        let calls = Calls::default();

        let records = vec![
            json!({ "id": "c1" }),
            json!({ "firstName": "no id" }),
            json!("not an object"),
            json!({ "id": "c4", "isVip": "no" }),
        ];

        let outcome = inserter
            .insert(&schema, &records, 0, |_, _| {}, recorder(&calls))
            .await
            .unwrap();

        assert_eq!(outcome.inserted_count, 2);
        assert_eq!(outcome.last_index, 3);
        assert_eq!(db.count_rows("clients").await.unwrap(), 2);

        let vip: Option<i64> = sqlx::query_scalar("SELECT is_vip FROM clients WHERE id = 'c4'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(vip, Some(0));
    }

    #[tokio::test]
    async fn test_rejected_insert_is_skipped_inside_batch() {
        let (db, inserter, schema) = setup(100, 100).await;
        let calls = Calls::default();
        sqlx::query(
            "CREATE TRIGGER reject_c1 BEFORE INSERT ON clients WHEN NEW.id = 'c1' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let outcome = inserter
            .insert(&schema, &clients(3), 0, |_, _| {}, recorder(&calls))
            .await
            .unwrap();

        assert_eq!(outcome.inserted_count, 2);
        assert_eq!(outcome.last_index, 2);
        assert_eq!(db.count_rows("clients").await.unwrap(), 2);
        assert_eq!(*calls.lock().unwrap(), vec![(2, 2)]);
    }

    #[tokio::test]
    async fn test_reinsert_is_idempotent() {
        let (db, inserter, schema) = setup(100, 100).await;
        let records = clients(5);

        for _ in 0..2 {
            inserter
                .insert(&schema, &records, 0, |_, _| {}, |_, _| async { Ok(()) })
                .await
                .unwrap();
        }

        assert_eq!(db.count_rows("clients").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_rows_get_contract_defaults() {
        let (db, inserter, schema) = setup(100, 100).await;

        inserter
            .insert(&schema, &clients(1), 0, |_, _| {}, |_, _| async { Ok(()) })
            .await
            .unwrap();

        let (created, updated, sync): (String, String, String) = sqlx::query_as(
            "SELECT created_at, updated_at, sync_status FROM clients WHERE id = 'c0'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();

        assert!(created.ends_with('Z'));
        assert_eq!(created, updated);
        assert_eq!(sync, "local");
    }

    #[tokio::test]
    async fn test_checkpoint_error_aborts() {
        let (_db, inserter, schema) = setup(5, 5).await;

        let err = inserter
            .insert(&schema, &clients(20), 0, |_, _| {}, |_, _| async {
                Err(DbError::Internal("checkpoint store gone".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Internal(_)));
    }
}
