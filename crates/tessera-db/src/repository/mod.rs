//! # Repository Module
//!
//! Repositories over the two tables the migration engine owns.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Orchestrator                         Startup runner / CLI              │
//! │       │                                     │                           │
//! │       │ db.checkpoints()                    │ db.status_tracker(v)      │
//! │       ▼                                     ▼                           │
//! │  CheckpointStore                      MigrationStatusTracker            │
//! │  ├── ensure_table()                   ├── get_status()                  │
//! │  ├── get(table) / get_all()           ├── set_complete(v, n, ms)        │
//! │  ├── save(checkpoint)                 ├── is_complete() / should_run()  │
//! │  └── clear_all()                      └── reset()                       │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  _migration_progress                  _data_migration_status            │
//! │  (one row per table, mid-run)         (one row, run boundaries only)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CheckpointStore`] - Per-table resume bookkeeping
//! - [`MigrationStatusTracker`] - Versioned "migration done" singleton

pub mod checkpoint;
pub mod status;

pub use checkpoint::CheckpointStore;
pub use status::MigrationStatusTracker;
