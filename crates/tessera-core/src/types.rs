//! # Domain Types
//!
//! Core types used throughout the Tessera migration engine.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  PERSISTED                                                              │
//! │  ┌──────────────────────┐            ┌──────────────────────┐          │
//! │  │ MigrationCheckpoint  │            │   MigrationStatus    │          │
//! │  │ ──────────────────── │            │ ──────────────────── │          │
//! │  │ table_name (key)     │            │ completed            │          │
//! │  │ last_migrated_index  │            │ version              │          │
//! │  │ total / inserted     │            │ migrated_at          │          │
//! │  │ status               │            │ total_records        │          │
//! │  │ one row per table    │            │ singleton (id = 1)   │          │
//! │  └──────────────────────┘            └──────────────────────┘          │
//! │                                                                         │
//! │  EPHEMERAL (returned to the caller / UI)                                │
//! │  ┌──────────────────────┐            ┌──────────────────────┐          │
//! │  │ TableMigrationResult │ ─── n ───► │   MigrationResult    │          │
//! │  └──────────────────────┘            └──────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Commit Points
//! Checkpoints are cleared by the orchestrator when a run succeeds. The
//! status row is flipped to `completed` afterwards by the caller. A crash
//! between the two simply re-runs an (idempotent) migration on next start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Checkpoint Status
// =============================================================================

/// Lifecycle status of one table's migration, as stored in `_migration_progress.status`.
///
/// ## State Machine
/// ```text
///             ┌──────────────────────────────┐
///             │                              ▼
///  pending ──►in_progress ──────────────► completed
///     │        │  ▲   ▲ (checkpoint)         ▲
///     │        ▼  │   │                      │
///     └─────► failed ─┴──────────────────────┘
///                 (retry)           (empty source on retry)
/// ```
/// `completed` is terminal: only `clear_all` removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Touched but no work recorded yet.
    #[default]
    Pending,
    /// Rows are being copied; `last_migrated_index` marks durable progress.
    InProgress,
    /// Every source record was attempted.
    Completed,
    /// A table-level error stopped the copy; retried on next run.
    Failed,
}

impl CheckpointStatus {
    /// Returns the persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: CheckpointStatus) -> bool {
        use CheckpointStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress | Completed | Failed)
                | (InProgress, InProgress | Completed | Failed)
                | (Failed, InProgress | Completed | Failed)
        )
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "in_progress" => Ok(CheckpointStatus::InProgress),
            "completed" => Ok(CheckpointStatus::Completed),
            "failed" => Ok(CheckpointStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Checkpoint State (typed view)
// =============================================================================

/// Typed view of a checkpoint row: each status carries only the data that
/// is meaningful for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointState {
    Pending,
    InProgress { last_index: i64, inserted: i64 },
    Completed { total: i64 },
    Failed { last_index: i64, inserted: i64, error: String },
}

/// Where a table's copy starts and what it has already inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumePoint {
    /// First source index to process.
    pub start_index: usize,
    /// Rows inserted by earlier runs (carried forward, never reset).
    pub baseline_inserted: i64,
}

// =============================================================================
// Migration Checkpoint
// =============================================================================

/// Durable per-table progress record (`_migration_progress` row).
///
/// ## Invariants
/// - `inserted_count <= total_count`
/// - `last_migrated_index < total_count` (`-1` = nothing processed yet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCheckpoint {
    /// Destination table name (primary key).
    pub table_name: String,

    /// Last source index attempted, or -1.
    pub last_migrated_index: i64,

    /// Source record count when the checkpoint was written.
    pub total_count: i64,

    /// Rows successfully written so far, across all runs.
    pub inserted_count: i64,

    /// Lifecycle status.
    pub status: CheckpointStatus,

    /// When the row was last written.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Table-level error of the last failed attempt.
    pub error_message: Option<String>,
}

impl MigrationCheckpoint {
    /// Creates a fresh `pending` checkpoint for a table.
    pub fn new(table_name: impl Into<String>) -> Self {
        MigrationCheckpoint {
            table_name: table_name.into(),
            last_migrated_index: -1,
            total_count: 0,
            inserted_count: 0,
            status: CheckpointStatus::Pending,
            updated_at: Utc::now(),
            error_message: None,
        }
    }

    /// Returns the typed state view.
    pub fn state(&self) -> CheckpointState {
        match self.status {
            CheckpointStatus::Pending => CheckpointState::Pending,
            CheckpointStatus::InProgress => CheckpointState::InProgress {
                last_index: self.last_migrated_index,
                inserted: self.inserted_count,
            },
            CheckpointStatus::Completed => CheckpointState::Completed {
                total: self.total_count,
            },
            CheckpointStatus::Failed => CheckpointState::Failed {
                last_index: self.last_migrated_index,
                inserted: self.inserted_count,
                error: self.error_message.clone().unwrap_or_default(),
            },
        }
    }

    /// Returns where a new run should start for this table.
    ///
    /// `in_progress` and `failed` resume right after `last_migrated_index`
    /// with their inserted count carried forward; anything else starts over.
    pub fn resume_point(&self) -> ResumePoint {
        match self.state() {
            CheckpointState::InProgress { last_index, inserted }
            | CheckpointState::Failed { last_index, inserted, .. } => ResumePoint {
                start_index: last_index.saturating_add(1).max(0) as usize,
                baseline_inserted: inserted.max(0),
            },
            CheckpointState::Pending | CheckpointState::Completed { .. } => ResumePoint::default(),
        }
    }

    /// Marks the table as being copied, before any row is written.
    pub fn begin(&mut self, total_count: i64, resume: ResumePoint) -> CoreResult<()> {
        self.transition(CheckpointStatus::InProgress)?;
        self.total_count = total_count.max(0);
        self.last_migrated_index = (resume.start_index as i64 - 1).min(self.total_count - 1);
        self.inserted_count = resume.baseline_inserted.min(self.total_count);
        self.error_message = None;
        Ok(())
    }

    /// Records durable progress mid-table.
    pub fn advance(&mut self, last_index: i64, inserted: i64) -> CoreResult<()> {
        self.transition(CheckpointStatus::InProgress)?;
        self.set_counts(last_index, inserted);
        Ok(())
    }

    /// Marks the table as fully migrated.
    pub fn complete(&mut self, last_index: i64, inserted: i64) -> CoreResult<()> {
        self.transition(CheckpointStatus::Completed)?;
        self.set_counts(last_index, inserted);
        self.error_message = None;
        Ok(())
    }

    /// Marks the table as failed, keeping whatever progress was recorded.
    pub fn fail(&mut self, error: impl Into<String>) -> CoreResult<()> {
        self.transition(CheckpointStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    fn set_counts(&mut self, last_index: i64, inserted: i64) {
        let total = self.total_count.max(0);
        self.last_migrated_index = last_index.clamp(-1, total - 1);
        self.inserted_count = inserted.clamp(0, total);
        self.touch();
    }

    fn transition(&mut self, next: CheckpointStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                table: self.table_name.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Skip Reason
// =============================================================================

/// Why a table was not migrated in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum SkipReason {
    /// The legacy store has no such table.
    #[serde(rename = "not found in source")]
    NotInSource,
    /// The destination table has not been created by the schema migrations.
    #[serde(rename = "destination schema missing")]
    DestinationMissing,
    /// A previous run already completed this table.
    #[serde(rename = "already completed")]
    AlreadyCompleted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotInSource => write!(f, "not found in source"),
            SkipReason::DestinationMissing => write!(f, "destination schema missing"),
            SkipReason::AlreadyCompleted => write!(f, "already completed"),
        }
    }
}

// =============================================================================
// Table Migration Result
// =============================================================================

/// Outcome of migrating one table.
///
/// `sqlite_count < dexie_count` on a non-skipped table means some records
/// were rejected individually. That is a soft warning, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TableMigrationResult {
    pub name: String,
    /// Records in the legacy store.
    #[ts(type = "number")]
    pub dexie_count: u64,
    /// Rows written to SQLite (including earlier resumed runs).
    #[ts(type = "number")]
    pub sqlite_count: u64,
    pub skipped: bool,
    pub skip_reason: Option<SkipReason>,
    #[ts(type = "number")]
    pub duration_ms: u64,
}

impl TableMigrationResult {
    /// A table that was copied (possibly zero rows).
    pub fn migrated(name: impl Into<String>, dexie_count: u64, sqlite_count: u64, duration_ms: u64) -> Self {
        TableMigrationResult {
            name: name.into(),
            dexie_count,
            sqlite_count,
            skipped: false,
            skip_reason: None,
            duration_ms,
        }
    }

    /// A table that was not touched this run.
    pub fn skipped(
        name: impl Into<String>,
        reason: SkipReason,
        dexie_count: u64,
        sqlite_count: u64,
        duration_ms: u64,
    ) -> Self {
        TableMigrationResult {
            name: name.into(),
            dexie_count,
            sqlite_count,
            skipped: true,
            skip_reason: Some(reason),
            duration_ms,
        }
    }

    /// A table whose migration hit a table-level error.
    pub fn failed(name: impl Into<String>, duration_ms: u64) -> Self {
        TableMigrationResult::migrated(name, 0, 0, duration_ms)
    }

    /// Returns true if some source records did not make it into SQLite.
    pub fn is_short(&self) -> bool {
        !self.skipped && self.sqlite_count < self.dexie_count
    }
}

// =============================================================================
// Migration Result
// =============================================================================

/// Aggregate outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// Correlates this run's log lines.
    pub run_id: String,
    /// False if any table hit a table-level error.
    pub success: bool,
    pub tables: Vec<TableMigrationResult>,
    /// One human-readable line per failed table.
    pub errors: Vec<String>,
    #[ts(type = "number")]
    pub total_records: u64,
    #[ts(type = "number")]
    pub duration_ms: u64,
}

impl MigrationResult {
    /// Tables that migrated fewer rows than the source holds.
    pub fn short_tables(&self) -> impl Iterator<Item = &TableMigrationResult> {
        self.tables.iter().filter(|t| t.is_short())
    }

    /// Finds a table's result by name.
    pub fn table(&self, name: &str) -> Option<&TableMigrationResult> {
        self.tables.iter().find(|t| t.name == name)
    }
}

// =============================================================================
// Migration Status
// =============================================================================

/// The singleton "has the one-time migration ever completed" record.
///
/// ## State Machine
/// ```text
/// not-run ──► (running, nothing persisted) ──► completed(vX)
///                                                   │
///                    code bumps version to vY > vX  │
///                                                   ▼
///                                     stale: should_run() = true
/// ```
/// A failed run persists nothing here: `completed` stays false and the next
/// start retries the whole orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub completed: bool,
    pub version: i64,
    #[ts(as = "Option<String>")]
    pub migrated_at: Option<DateTime<Utc>>,
    pub total_records: i64,
    pub duration_ms: i64,
}

impl Default for MigrationStatus {
    fn default() -> Self {
        MigrationStatus {
            completed: false,
            version: 0,
            migrated_at: None,
            total_records: 0,
            duration_ms: 0,
        }
    }
}

impl MigrationStatus {
    /// Returns true if the migration must (re-)run for `current_version`.
    pub fn should_run(&self, current_version: i64) -> bool {
        !self.completed || self.version < current_version
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
