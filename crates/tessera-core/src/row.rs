//! # Record → Row Conversion
//!
//! Turns one schema-less legacy record into the column list and values of a
//! single `INSERT OR REPLACE` statement.
//!
//! ## Conversion Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    convert_record(schema, record, now)                  │
//! │                                                                         │
//! │  { "id": "c1", "firstName": "Ana", "isVip": "yes",                     │
//! │    "createdAt": 1705314600000, "tags": ["new"], "legacyFlag": 1 }      │
//! │       │                                                                 │
//! │       ▼  camelCase → snake_case                                         │
//! │  id, first_name, is_vip, created_at, tags, legacy_flag                 │
//! │       │                                                                 │
//! │       ▼  keep only destination columns (legacy_flag dropped)            │
//! │       │                                                                 │
//! │       ▼  convert by column kind                                         │
//! │  is_vip      BOOLEAN  → bool_to_sqlite  → 1                            │
//! │  created_at  date     → to_iso_string   → "2024-01-15T10:30:00.000Z"   │
//! │  tags        plain    → to_json_string  → '["new"]'                    │
//! │       │                                                                 │
//! │       ▼  defaults: updated_at = now, sync_status = 'local'              │
//! │                                                                         │
//! │  ConvertedRow { columns, values }                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The only failures are structural (not an object, no primary key): they
//! are record-level and the batch inserter skips the record.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::convert::{bool_to_sqlite, camel_to_snake, datetime_to_iso, to_iso_string, to_json_string, SqlValue};
use crate::error::ConversionError;
use crate::plan::tracks_sync_status;

/// A legacy record as read from the source store.
pub type Record = Value;

/// Value given to `sync_status` when the record has none.
pub const DEFAULT_SYNC_STATUS: &str = "local";

// =============================================================================
// Destination Schema
// =============================================================================

/// How a destination column's values are converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Declared `BOOLEAN`: every value goes through `bool_to_sqlite`.
    Boolean,
    /// Timestamp/date column: values are canonicalized to ISO-8601 text.
    Date,
    /// Everything else: stored by JSON type.
    Plain,
}

/// One column of a destination table (`PRAGMA table_info` row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk_position: i64,
}

impl ColumnInfo {
    /// Creates a column description.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        ColumnInfo {
            name: name.into(),
            declared_type: declared_type.into(),
            not_null: false,
            pk_position: 0,
        }
    }

    /// Marks the column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.pk_position = 1;
        self.not_null = true;
        self
    }

    /// Classifies the column from its declared type and name.
    pub fn kind(&self) -> ColumnKind {
        let ty = self.declared_type.to_ascii_uppercase();
        if ty.contains("BOOL") {
            return ColumnKind::Boolean;
        }

        let date_type = ty.contains("DATE") || ty.contains("TIME");
        let date_name =
            self.name.ends_with("_at") || self.name.ends_with("_date") || self.name == "date";
        let numeric = ty.contains("INT") || ty.contains("REAL") || ty.contains("NUM");

        if date_type || (date_name && !numeric) {
            ColumnKind::Date
        } else {
            ColumnKind::Plain
        }
    }
}

/// Column layout of one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Creates a schema description.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        TableSchema {
            table: table.into(),
            columns,
        }
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the table has the named column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary-key columns in key order.
    pub fn primary_key(&self) -> Vec<&ColumnInfo> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.pk_position > 0).collect();
        pk.sort_by_key(|c| c.pk_position);
        pk
    }
}

// =============================================================================
// Converted Row
// =============================================================================

/// Columns and values ready to bind, plus the source fields that had no column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertedRow {
    pub columns: Vec<String>,
    pub values: Vec<SqlValue>,
    pub dropped_fields: Vec<String>,
}

impl ConvertedRow {
    /// Returns the value bound to a column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    fn set(&mut self, column: String, value: SqlValue) {
        match self.columns.iter().position(|c| *c == column) {
            Some(i) => self.values[i] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    fn is_missing(&self, column: &str) -> bool {
        self.get(column).map_or(true, SqlValue::is_null)
    }
}

// =============================================================================
// Conversion
// =============================================================================

/// Converts one legacy record into a destination row.
///
/// ## Guarantees
/// - `created_at` / `updated_at` are always set (to `now` if absent or invalid)
/// - `sync_status` defaults to `'local'` except on settings/device tables
/// - fields without a destination column are reported in `dropped_fields`
///
/// Each default only applies when the destination table has that column.
pub fn convert_record(
    schema: &TableSchema,
    record: &Record,
    now: DateTime<Utc>,
) -> Result<ConvertedRow, ConversionError> {
    let fields = record.as_object().ok_or_else(|| ConversionError::NotAnObject {
        table: schema.table.clone(),
    })?;

    let mut row = ConvertedRow::default();

    for (key, value) in fields {
        let column = camel_to_snake(key);
        let Some(info) = schema.column(&column) else {
            row.dropped_fields.push(key.clone());
            continue;
        };

        // "firstName" and "first_name" both present: the literal column name wins
        if row.get(&column).is_some() && *key != column {
            continue;
        }
        row.set(column, convert_value(info, value));
    }

    let now_iso = datetime_to_iso(now);
    for column in ["created_at", "updated_at"] {
        if schema.has_column(column) && row.is_missing(column) {
            row.set(column.to_string(), SqlValue::Text(now_iso.clone()));
        }
    }
    if tracks_sync_status(&schema.table)
        && schema.has_column("sync_status")
        && row.is_missing("sync_status")
    {
        row.set(
            "sync_status".to_string(),
            SqlValue::Text(DEFAULT_SYNC_STATUS.to_string()),
        );
    }

    for pk in schema.primary_key() {
        if row.is_missing(&pk.name) {
            return Err(ConversionError::MissingPrimaryKey {
                table: schema.table.clone(),
                column: pk.name.clone(),
            });
        }
    }

    if row.columns.is_empty() {
        return Err(ConversionError::NoMatchingColumns {
            table: schema.table.clone(),
        });
    }

    Ok(row)
}

/// Converts a single field for its destination column.
pub fn convert_value(column: &ColumnInfo, value: &Value) -> SqlValue {
    match column.kind() {
        ColumnKind::Boolean => SqlValue::from(bool_to_sqlite(value)),
        ColumnKind::Date => SqlValue::from(to_iso_string(value)),
        ColumnKind::Plain => match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::from(to_json_string(value)),
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
