//! # Legacy Source Enumerators
//!
//! The minimal read interface the migration needs from the legacy document
//! store, and the implementations that provide it.
//!
//! ## Interface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SourceEnumerator                                 │
//! │                                                                         │
//! │  has_table("clients")  → true / false   (absent = skip, not an error)  │
//! │  count("clients")      → 2                                             │
//! │  to_array("clients")   → [ {...}, {...} ]   (stable order)             │
//! │                                                                         │
//! │  ┌──────────────────┐           ┌──────────────────────────────────┐   │
//! │  │   MemorySource   │           │        JsonExportSource          │   │
//! │  │ table → Vec<Rec> │ ◄──wraps──│ dexie export file / plain object │   │
//! │  └──────────────────┘           └──────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Indexes into `to_array` are what checkpoints record, so an implementation
//! must return records in the same order on every call.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use tracing::{debug, info};

use tessera_core::Record;

use crate::error::{DbError, DbResult};

/// Read access to the legacy store, one table at a time.
pub trait SourceEnumerator: Send + Sync {
    /// Returns true if the legacy store has this table (even if empty).
    fn has_table(&self, table: &str) -> impl Future<Output = bool> + Send;

    /// Counts the records of a table.
    fn count(&self, table: &str) -> impl Future<Output = DbResult<usize>> + Send;

    /// Reads every record of a table, in stable order.
    fn to_array(&self, table: &str) -> impl Future<Output = DbResult<Vec<Record>>> + Send;
}

// =============================================================================
// Memory Source
// =============================================================================

/// Legacy tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, Vec<Record>>,
}

impl MemorySource {
    /// Creates an empty source (every table absent).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a table.
    pub fn with_table(mut self, table: impl Into<String>, records: Vec<Record>) -> Self {
        self.insert_table(table, records);
        self
    }

    /// Adds (or replaces) a table in place.
    pub fn insert_table(&mut self, table: impl Into<String>, records: Vec<Record>) {
        self.tables.insert(table.into(), records);
    }

    /// Names of the tables present, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn records(&self, table: &str) -> DbResult<&Vec<Record>> {
        self.tables
            .get(table)
            .ok_or_else(|| DbError::source(format!("table '{}' not found in source", table)))
    }
}

impl SourceEnumerator for MemorySource {
    async fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    async fn count(&self, table: &str) -> DbResult<usize> {
        Ok(self.records(table)?.len())
    }

    async fn to_array(&self, table: &str) -> DbResult<Vec<Record>> {
        Ok(self.records(table)?.clone())
    }
}

// =============================================================================
// JSON Export Source
// =============================================================================

/// Key the export format uses for per-row type annotations.
const TYPES_KEY: &str = "$types";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexieExport {
    data: DexieData,
}

#[derive(Debug, Deserialize)]
struct DexieData {
    #[serde(default)]
    tables: Vec<DexieTableInfo>,
    #[serde(default)]
    data: Vec<DexieTableRows>,
}

#[derive(Debug, Deserialize)]
struct DexieTableInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexieTableRows {
    table_name: String,
    #[serde(default)]
    rows: Vec<Value>,
}

/// A legacy store export loaded from a JSON file.
///
/// ## Accepted Layouts
/// ```text
/// Dexie export                                  Plain object
/// {                                             {
///   "formatName": "dexie",                        "clients": [ {...} ],
///   "data": {                                     "staff":   [ {...} ]
///     "tables": [ { "name": "clients" } ],      }
///     "data": [
///       { "tableName": "clients", "rows": [ {...} ] }
///     ]
///   }
/// }
/// ```
/// Tables listed in the Dexie `tables` metadata without rows are present
/// and empty. Rows are passed through as-is apart from the `$types`
/// annotation, which is removed. Rows that are not objects fail later,
/// one record at a time.
#[derive(Debug, Clone)]
pub struct JsonExportSource {
    inner: MemorySource,
}

impl JsonExportSource {
    /// Reads and parses an export file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading legacy export");

        let contents = std::fs::read_to_string(path).map_err(|e| {
            DbError::source(format!("cannot read export {}: {}", path.display(), e))
        })?;

        Self::from_json_str(&contents)
    }

    /// Parses export text.
    pub fn from_json_str(contents: &str) -> DbResult<Self> {
        let value: Value = serde_json::from_str(contents)?;
        Self::from_value(value)
    }

    /// Builds the source from an already parsed export document.
    pub fn from_value(value: Value) -> DbResult<Self> {
        let is_dexie = value.get("formatName").and_then(Value::as_str) == Some("dexie");
        let inner = if is_dexie {
            Self::parse_dexie(value)?
        } else {
            Self::parse_plain(value)?
        };

        for name in inner.table_names() {
            debug!(table = name, records = inner.tables[name].len(), "Export table loaded");
        }

        Ok(JsonExportSource { inner })
    }

    fn parse_dexie(value: Value) -> DbResult<MemorySource> {
        let export: DexieExport = serde_json::from_value(value)?;
        let mut source = MemorySource::new();

        for table in export.data.tables {
            source.insert_table(table.name, Vec::new());
        }

        for table in export.data.data {
            let rows = table.rows.into_iter().map(strip_type_annotations).collect();
            source.insert_table(table.table_name, rows);
        }

        Ok(source)
    }

    fn parse_plain(value: Value) -> DbResult<MemorySource> {
        let Value::Object(tables) = value else {
            return Err(DbError::source("export must be a JSON object"));
        };

        let mut source = MemorySource::new();
        for (name, rows) in tables {
            let Value::Array(rows) = rows else {
                return Err(DbError::source(format!(
                    "export table '{}' is not an array",
                    name
                )));
            };
            source.insert_table(name, rows.into_iter().map(strip_type_annotations).collect());
        }

        Ok(source)
    }

    /// Names of the tables in the export, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.inner.table_names()
    }
}

fn strip_type_annotations(mut row: Value) -> Value {
    if let Value::Object(fields) = &mut row {
        fields.remove(TYPES_KEY);
    }
    row
}

impl SourceEnumerator for JsonExportSource {
    async fn has_table(&self, table: &str) -> bool {
        self.inner.has_table(table).await
    }

    async fn count(&self, table: &str) -> DbResult<usize> {
        self.inner.count(table).await
    }

    async fn to_array(&self, table: &str) -> DbResult<Vec<Record>> {
        self.inner.to_array(table).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_source_absent_vs_empty() {
        let source = MemorySource::new()
            .with_table("clients", vec![json!({"id": "c1"})])
            .with_table("staff", vec![]);

        assert!(source.has_table("clients").await);
        assert!(source.has_table("staff").await);
        assert!(!source.has_table("devices").await);

        assert_eq!(source.count("clients").await.unwrap(), 1);
        assert_eq!(source.count("staff").await.unwrap(), 0);
        assert!(source.count("devices").await.is_err());
    }

    #[tokio::test]
    async fn test_dexie_export() {
        let export = json!({
            "formatName": "dexie",
            "formatVersion": 1,
            "data": {
                "databaseName": "pos",
                "databaseVersion": 12,
                "tables": [
                    { "name": "clients", "schema": "id", "rowCount": 2 },
                    { "name": "devices", "schema": "id", "rowCount": 0 }
                ],
                "data": [{
                    "tableName": "clients",
                    "inbound": true,
                    "rows": [
                        { "id": "c1", "createdAt": "2024-01-15T10:30:00.000Z",
                          "$types": { "createdAt": "date" } },
                        { "id": "c2" }
                    ]
                }]
            }
        });

        let source = JsonExportSource::from_value(export).unwrap();
        assert_eq!(source.table_names(), vec!["clients", "devices"]);
        assert_eq!(source.count("devices").await.unwrap(), 0);

        let rows = source.to_array("clients").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("$types").is_none());
        assert_eq!(rows[0]["createdAt"], "2024-01-15T10:30:00.000Z");
    }

    #[tokio::test]
    async fn test_plain_export_keeps_order_and_odd_rows() {
        let source = JsonExportSource::from_json_str(
            r#"{ "staff": [ {"id": "s2"}, {"id": "s1"}, "garbage" ] }"#,
        )
        .unwrap();

        let rows = source.to_array("staff").await.unwrap();
        assert_eq!(rows[0]["id"], "s2");
        assert_eq!(rows[1]["id"], "s1");
        assert_eq!(rows[2], json!("garbage"));
    }

    #[test]
    fn test_malformed_exports() {
        assert!(JsonExportSource::from_json_str("[1, 2]").is_err());
        assert!(JsonExportSource::from_json_str(r#"{"clients": 3}"#).is_err());
        assert!(JsonExportSource::from_json_str("{not json").is_err());
    }

    #[tokio::test]
    async fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, r#"{ "clients": [ {"id": "c1"} ] }"#).unwrap();

        let source = JsonExportSource::open(&path).unwrap();
        assert_eq!(source.count("clients").await.unwrap(), 1);

        let err = JsonExportSource::open(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, DbError::Source(_)));
    }
}
