//! # Database Error Types
//!
//! Error types for database and migration operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)   Source read   Config file                 │
//! │       │                            │             │                      │
//! │       ▼                            ▼             ▼                      │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── inside a batch, per record  → warn! + skip (record-level)    │
//! │       │                                                                 │
//! │       ├── escaping the table migrator → failed checkpoint,             │
//! │       │                                 MigrationResult.errors          │
//! │       │                                                                 │
//! │       └── status tracker reads        → swallowed, "not completed"     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tessera_core::{ConversionError, CoreError};
use thiserror::Error;

/// Database and migration errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for logging and for the per-table error list of a run.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - A destination table has no column information
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - A secondary UNIQUE index rejects a migrated row
    ///   (primary-key clashes are replaced, never reported)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation {
        field: String,
        value: String,
    },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation {
        message: String,
    },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Destination schema migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    ///
    /// ## When This Occurs
    /// - Runtime SQL error (NOT NULL, CHECK, trigger abort)
    /// - Unknown table or column
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed (begin or commit).
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// The legacy source could not be read.
    #[error("Source error: {0}")]
    Source(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record could not be converted to a row.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Domain rule violated (e.g. illegal checkpoint transition).
    #[error(transparent)]
    Core(CoreError),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Source error.
    pub fn source(message: impl Into<String>) -> Self {
        DbError::Source(message.into())
    }

    /// Creates a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        DbError::Config(message.into())
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error codes for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(io) => DbError::Io(io),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Conversion(conversion) => DbError::Conversion(conversion),
            other => DbError::Core(other),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Source(format!("invalid JSON: {}", err))
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::Config(format!("invalid TOML: {}", err))
    }
}

impl From<toml::ser::Error> for DbError {
    fn from(err: toml::ser::Error) -> Self {
        DbError::Config(format!("cannot serialize config: {}", err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_core_conversion_is_unwrapped() {
        let core = CoreError::Conversion(ConversionError::NotAnObject {
            table: "clients".to_string(),
        });
        let err: DbError = core.into();
        assert!(matches!(err, DbError::Conversion(_)));

        let err: DbError = CoreError::UnknownStatus("done".to_string()).into();
        assert!(matches!(err, DbError::Core(_)));
    }

    #[test]
    fn test_json_error_is_a_source_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DbError = json_err.into();
        assert!(err.to_string().starts_with("Source error: invalid JSON"));
    }
}
