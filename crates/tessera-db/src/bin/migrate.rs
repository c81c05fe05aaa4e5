//! # tessera-migrate
//!
//! Runs the legacy store → SQLite data migration from the command line.
//!
//! ## Usage
//! ```bash
//! # Migrate an exported legacy store (no-op if already migrated)
//! cargo run -p tessera-db --bin tessera-migrate -- run --source ./export.json
//!
//! # Re-run even if the status row says the data is migrated
//! cargo run -p tessera-db --bin tessera-migrate -- run --source ./export.json --force
//!
//! # Inspect the status row and any checkpoints left by an interrupted run
//! cargo run -p tessera-db --bin tessera-migrate -- --db ./data/tessera.db status
//!
//! # Forget the completed run (and, optionally, all checkpoints)
//! cargo run -p tessera-db --bin tessera-migrate -- reset --checkpoints
//! ```
//!
//! Exits non-zero when a run finishes with table errors.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tessera_db::{
    run_data_migration, Database, DbError, DbResult, JsonExportSource, MigrationConfig,
    StartupOutcome,
};

#[derive(Parser)]
#[command(name = "tessera-migrate")]
#[command(about = "Migrate Tessera POS data from the legacy store into SQLite")]
#[command(version)]
struct Cli {
    /// SQLite database file (overrides config and TESSERA_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to migration.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the data migration if it is needed
    Run {
        /// Legacy store export file (Dexie export or plain JSON)
        #[arg(long)]
        source: Option<PathBuf>,

        /// Run even if the current version is already migrated
        #[arg(long)]
        force: bool,
    },

    /// Show the status row and pending checkpoints
    Status,

    /// Reset the status row so the next start migrates again
    Reset {
        /// Also clear per-table checkpoints
        #[arg(long)]
        checkpoints: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "tessera-migrate failed");
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Initializes logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tessera=trace` - Show trace for tessera crates only
/// - Default: INFO, with engine debug output
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tessera=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> DbResult<bool> {
    let cli = Cli::parse();

    let mut config = MigrationConfig::load(cli.config)?;
    if let Some(path) = cli.db {
        config.database.path = path;
    }

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(path = %config.database.path.display(), "Opening database");
    let db = Database::new(config.db_config()).await?;

    let ok = match cli.command {
        Commands::Run { source, force } => run_migration(&db, &config, source, force).await?,
        Commands::Status => {
            print_status(&db, &config).await;
            true
        }
        Commands::Reset { checkpoints } => {
            reset(&db, &config, checkpoints).await?;
            true
        }
    };

    db.close().await;
    Ok(ok)
}

async fn run_migration(
    db: &Database,
    config: &MigrationConfig,
    source: Option<PathBuf>,
    force: bool,
) -> DbResult<bool> {
    let path = source
        .or_else(|| config.source.export_path.clone())
        .ok_or_else(|| {
            DbError::config("no legacy export given (use --source or TESSERA_SOURCE_PATH)")
        })?;
    let source = JsonExportSource::open(&path)?;

    let outcome = run_data_migration(db, &source, &config.migration, force, |table, done, total| {
        eprintln!("  {:<24} {:>7}/{}", table, done, total);
    })
    .await?;

    match &outcome {
        StartupOutcome::AlreadyComplete(status) => {
            println!(
                "Already migrated (version {}, {} records). Use --force to run again.",
                status.version, status.total_records
            );
        }
        StartupOutcome::Ran(result) => {
            println!(
                "Run {}: {} ({} records in {} ms)",
                result.run_id,
                if result.success { "success" } else { "FAILED" },
                result.total_records,
                result.duration_ms
            );

            for table in &result.tables {
                let note = match &table.skip_reason {
                    Some(reason) => format!("skipped: {}", reason),
                    None if table.is_short() => "short".to_string(),
                    None => String::new(),
                };
                println!(
                    "  {:<24} {:>7} → {:<7} {}",
                    table.name, table.dexie_count, table.sqlite_count, note
                );
            }

            for e in &result.errors {
                println!("  error: {}", e);
            }
        }
    }

    Ok(outcome.is_ok())
}

async fn print_status(db: &Database, config: &MigrationConfig) {
    let tracker = db.status_tracker(config.migration.current_version);
    let status = tracker.get_status().await;

    println!("Data migration status");
    println!("  completed:     {}", status.completed);
    println!("  version:       {} (current {})", status.version, tracker.current_version());
    match status.migrated_at {
        Some(at) => println!("  migrated at:   {}", at.to_rfc3339()),
        None => println!("  migrated at:   -"),
    }
    println!("  total records: {}", status.total_records);
    println!("  duration:      {} ms", status.duration_ms);
    println!("  should run:    {}", status.should_run(tracker.current_version()));

    let checkpoints = db.checkpoints().get_all().await;
    if checkpoints.is_empty() {
        println!("No checkpoints");
        return;
    }

    println!("Checkpoints");
    for cp in checkpoints {
        println!(
            "  {:<24} {:<12} {:>7}/{:<7} last={} {}",
            cp.table_name,
            cp.status.as_str(),
            cp.inserted_count,
            cp.total_count,
            cp.last_migrated_index,
            cp.error_message.as_deref().unwrap_or("")
        );
    }
}

async fn reset(db: &Database, config: &MigrationConfig, checkpoints: bool) -> DbResult<()> {
    db.status_tracker(config.migration.current_version).reset().await?;
    println!("Status row reset");

    if checkpoints {
        let store = db.checkpoints();
        store.ensure_table().await?;
        let cleared = store.clear_all().await?;
        println!("Cleared {} checkpoints", cleared);
    }

    Ok(())
}
