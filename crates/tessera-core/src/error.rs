//! # Error Types
//!
//! Domain-specific error types for tessera-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tessera-core errors (this file)                                       │
//! │  ├── CoreError        - Checkpoint state / parsing failures            │
//! │  └── ConversionError  - A single record could not become a row         │
//! │                                                                         │
//! │  tessera-db errors (separate crate)                                    │
//! │  └── DbError          - Database, source and config failures           │
//! │                                                                         │
//! │  Flow: ConversionError → CoreError → DbError → MigrationResult.errors  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Severity
//! A `ConversionError` is always **record-level**: the batch inserter logs it
//! and moves on to the next record. It never reaches `MigrationResult.errors`.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core migration logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A persisted status string is not one of the known checkpoint states.
    #[error("Unknown checkpoint status: '{0}'")]
    UnknownStatus(String),

    /// A checkpoint was asked to move along an edge the state machine forbids.
    ///
    /// ## Valid Edges
    /// ```text
    /// pending ──► in_progress ──► completed
    ///                  │  ▲
    ///                  ▼  │
    ///                 failed
    /// ```
    #[error("Invalid checkpoint transition for {table}: {from} -> {to}")]
    InvalidTransition {
        table: String,
        from: String,
        to: String,
    },

    /// Record conversion error (wraps ConversionError).
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),
}

// =============================================================================
// Conversion Error
// =============================================================================

/// Errors turning one schema-less record into a relational row.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The source record is not a JSON object.
    #[error("{table}: record is not an object")]
    NotAnObject { table: String },

    /// The record has no value for a primary-key column.
    #[error("{table}: record is missing primary key '{column}'")]
    MissingPrimaryKey { table: String, column: String },

    /// None of the record's fields map onto a destination column.
    #[error("{table}: record has no fields matching destination columns")]
    NoMatchingColumns { table: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
