//! # Migration Plan
//!
//! The fixed table order and the pure per-table decision the table migrator
//! acts on.
//!
//! ## Per-Table Decision (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  source table absent?          ──yes──► Skip(not found in source)      │
//! │       │ no                                                              │
//! │  destination table absent?     ──yes──► Skip(destination schema        │
//! │       │ no                                       missing)               │
//! │  checkpoint completed?         ──yes──► Skip(already completed)        │
//! │       │ no                                                              │
//! │  ────────────── count source records ──────────────                     │
//! │  zero records?                 ──yes──► CompleteEmpty                   │
//! │       │ no                                                              │
//! │  checkpoint in_progress/failed ──yes──► Copy(from last+1, baseline)    │
//! │       │ no                                                              │
//! │       └──────────────────────────────► Copy(from 0, baseline 0)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An empty table is a successfully migrated table, distinct from a skip.

use crate::types::{CheckpointStatus, MigrationCheckpoint, ResumePoint, SkipReason};

/// Tables in migration order.
///
/// Some records carry denormalized references that are expected to exist
/// already, so referenced entities go first. Nothing enforces this at insert
/// time.
pub const MIGRATION_ORDER: &[&str] = &[
    // Core entities
    "clients",
    "staff",
    "services",
    "service_categories",
    // Entities referencing them
    "appointments",
    "tickets",
    "transactions",
    "payments",
    // Secondary / denormalized data
    "ticket_services",
    "client_notes",
    "client_preferences",
    "staff_timesheets",
    // Catalog
    "product_categories",
    "products",
    // Scheduling
    "staff_schedules",
    "time_off_requests",
    "blocked_times",
    // Gift cards
    "gift_cards",
    "gift_card_transactions",
    // Infrastructure
    "settings",
    "devices",
    "sync_queue",
];

/// Tables whose rows are device-local and never carry a `sync_status`.
pub const NO_SYNC_STATUS_TABLES: &[&str] = &["settings", "devices"];

/// Returns true if rows of `table` get the `sync_status = 'local'` default.
pub fn tracks_sync_status(table: &str) -> bool {
    !NO_SYNC_STATUS_TABLES.contains(&table)
}

// =============================================================================
// Preflight
// =============================================================================

/// What is known about a table before its source records are counted.
#[derive(Debug, Clone, Copy)]
pub struct TableFacts<'a> {
    pub source_present: bool,
    pub destination_present: bool,
    pub checkpoint: Option<&'a MigrationCheckpoint>,
}

/// A decision to leave a table alone this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skip {
    pub reason: SkipReason,
    pub dexie_count: u64,
    pub sqlite_count: u64,
}

/// Decides whether a table is skipped, without touching the source records.
///
/// An already-completed table reports the counts stored in its checkpoint.
pub fn preflight(facts: TableFacts<'_>) -> Option<Skip> {
    if !facts.source_present {
        return Some(Skip {
            reason: SkipReason::NotInSource,
            dexie_count: 0,
            sqlite_count: 0,
        });
    }

    if !facts.destination_present {
        return Some(Skip {
            reason: SkipReason::DestinationMissing,
            dexie_count: 0,
            sqlite_count: 0,
        });
    }

    match facts.checkpoint {
        Some(cp) if cp.status == CheckpointStatus::Completed => Some(Skip {
            reason: SkipReason::AlreadyCompleted,
            dexie_count: cp.total_count.max(0) as u64,
            sqlite_count: cp.inserted_count.max(0) as u64,
        }),
        _ => None,
    }
}

// =============================================================================
// Copy Plan
// =============================================================================

/// What to do with a table that passed preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAction {
    /// The source table is empty: record it as completed with zero rows.
    CompleteEmpty,
    /// Copy records starting at the resume point.
    Copy(ResumePoint),
}

/// Plans the copy for a table with `source_count` records.
pub fn plan_copy(checkpoint: Option<&MigrationCheckpoint>, source_count: usize) -> TableAction {
    if source_count == 0 {
        return TableAction::CompleteEmpty;
    }
    TableAction::Copy(checkpoint.map(MigrationCheckpoint::resume_point).unwrap_or_default())
}

// =============================================================================
// Unit Tests
// =============================================================================
