//! # tessera-core: Pure Migration Logic for Tessera POS
//!
//! This crate holds every decision of the legacy-store → SQLite data
//! migration that can be made without touching a database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Tessera Data Migration                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  App startup / tessera-migrate CLI              │   │
//! │  │        status.should_run()? ──► orchestrator.run() ──► done     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               tessera-db (orchestrator, stores, SQL)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ tessera-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  convert  │  │    row    │  │   types   │  │   plan    │  │   │
//! │  │   │ SqlValue  │  │ Record →  │  │Checkpoint │  │ order +   │  │   │
//! │  │   │ dates/bool│  │ columns   │  │ Results   │  │ decisions │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO FILES • TOTAL CONVERSIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`convert`] - Type conversion layer (dates, booleans, JSON, names)
//! - [`row`] - Record → destination row conversion
//! - [`types`] - Checkpoint state machine, results, status
//! - [`plan`] - Table order and per-table skip/resume/fresh-start planning
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use serde_json::json;
//! use tessera_core::convert::{bool_to_sqlite, to_iso_string};
//!
//! assert_eq!(bool_to_sqlite(&json!("no")), Some(0));
//! assert_eq!(
//!     to_iso_string(&json!(0)).as_deref(),
//!     Some("1970-01-01T00:00:00.000Z")
//! );
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod convert;
pub mod error;
pub mod plan;
pub mod row;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use convert::SqlValue;
pub use error::{ConversionError, CoreError, CoreResult};
pub use plan::MIGRATION_ORDER;
pub use row::{ColumnInfo, ConvertedRow, Record, TableSchema};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Records written per destination transaction.
pub const BATCH_SIZE: usize = 100;

/// Maximum records processed between two checkpoint writes.
///
/// ## Why It Matters
/// This bounds how much work a crash can throw away: at most this many
/// records are re-processed (idempotently) on resume.
pub const CHECKPOINT_INTERVAL: usize = 100;

/// Version of the migrated data format.
///
/// Bump it after a breaking change to how records are converted: devices
/// that completed an older version will run the migration again.
pub const CURRENT_MIGRATION_VERSION: i64 = 1;
