//! # Data Migrator
//!
//! Copies the legacy document store into SQLite, resumably.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  run_data_migration()        status row gate (once per data version)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MigrationOrchestrator       all tables in order, aggregate result      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TableMigrator               plan + checkpoint lifecycle for one table  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BatchInserter               N records per transaction, upserts         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod orchestrator;
pub mod table;

pub use batch::{BatchInserter, BatchOutcome};
pub use orchestrator::MigrationOrchestrator;
pub use table::TableMigrator;

use tracing::{info, warn};

use tessera_core::{MigrationResult, MigrationStatus};

use crate::config::MigrationSettings;
use crate::error::DbResult;
use crate::pool::Database;
use crate::source::SourceEnumerator;

/// What the startup runner did.
#[derive(Debug, Clone)]
pub enum StartupOutcome {
    /// The data is already migrated at the current version.
    AlreadyComplete(MigrationStatus),
    /// A run happened (successful or not).
    Ran(MigrationResult),
}

impl StartupOutcome {
    /// Returns true unless a run happened and failed.
    pub fn is_ok(&self) -> bool {
        match self {
            StartupOutcome::AlreadyComplete(_) => true,
            StartupOutcome::Ran(result) => result.success,
        }
    }
}

/// Runs the data migration if the status row says it is needed.
///
/// ## Arguments
/// * `db` - Destination database (schema already migrated)
/// * `source` - Legacy store
/// * `settings` - Batch tuning and the current data version
/// * `force` - Run even if the status row says the data is migrated
/// * `progress` - `(table, current, total)` callback
///
/// ## Returns
/// * `Ok(AlreadyComplete)` - Nothing to do
/// * `Ok(Ran(result))` - A run happened; on success the status row is stamped
pub async fn run_data_migration<S, P>(
    db: &Database,
    source: &S,
    settings: &MigrationSettings,
    force: bool,
    progress: P,
) -> DbResult<StartupOutcome>
where
    S: SourceEnumerator,
    P: FnMut(&str, usize, usize),
{
    let tracker = db.status_tracker(settings.current_version);

    if !force && !tracker.should_run().await {
        let status = tracker.get_status().await;
        info!(version = status.version, "Data migration already complete");
        return Ok(StartupOutcome::AlreadyComplete(status));
    }

    let result = MigrationOrchestrator::new(db, source, settings)
        .run(progress)
        .await?;

    if result.success {
        let stamped = tracker
            .set_complete(
                settings.current_version,
                result.total_records as i64,
                result.duration_ms as i64,
            )
            .await;

        // The copy is durable either way; the next start just re-verifies it
        if let Err(e) = stamped {
            warn!(error = %e, "Cannot record migration status");
        }
    } else {
        warn!(errors = ?result.errors, "Data migration finished with errors");
    }

    Ok(StartupOutcome::Ran(result))
}

// =============================================================================
// Unit Tests
// =============================================================================
