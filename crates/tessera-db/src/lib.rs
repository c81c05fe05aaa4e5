//! # tessera-db: Data Migration Engine for Tessera POS
//!
//! Moves the point-of-sale data out of the legacy browser document store
//! and into SQLite, once per data version, surviving crashes at any point.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Tessera POS Data Migration                         │
//! │                                                                         │
//! │  App startup / tessera-migrate CLI                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tessera-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Source     │    │   Migrator    │    │ Repositories │  │   │
//! │  │   │  (source.rs)  │    │ (migrator/)   │    │              │  │   │
//! │  │   │               │    │               │    │ Checkpoints  │  │   │
//! │  │   │ MemorySource  │───►│ Orchestrator  │───►│ StatusRow    │  │   │
//! │  │   │ JsonExport    │    │ TableMigrator │    │              │  │   │
//! │  │   │               │    │ BatchInserter │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                               │                                 │   │
//! │  │                     tessera-core (convert, plan)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/tessera-pos/tessera.db                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and schema introspection
//! - [`migrations`] - Embedded destination schema migrations
//! - [`error`] - Database error types
//! - [`config`] - TOML + environment configuration
//! - [`source`] - Legacy store enumerators
//! - [`repository`] - Checkpoint store and status tracker
//! - [`migrator`] - Batch inserter, table migrator, orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_db::{run_data_migration, Database, JsonExportSource, MigrationConfig};
//!
//! let config = MigrationConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let source = JsonExportSource::open("legacy-export.json")?;
//!
//! let outcome = run_data_migration(&db, &source, &config.migration, false, |table, done, total| {
//!     println!("{table}: {done}/{total}");
//! })
//! .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod migrator;
pub mod pool;
pub mod repository;
pub mod source;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{MigrationConfig, MigrationSettings};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use source::{JsonExportSource, MemorySource, SourceEnumerator};

pub use migrator::{run_data_migration, MigrationOrchestrator, StartupOutcome};
pub use repository::{CheckpointStore, MigrationStatusTracker};
