//! # Type Conversion Layer
//!
//! Pure functions mapping between schema-less document values and the three
//! primitive storage classes SQLite actually stores (INTEGER, REAL, TEXT).
//!
//! ## The Two Type Systems
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Legacy Store → SQLite Mapping                        │
//! │                                                                         │
//! │  Legacy document value          SqlValue             Read back          │
//! │  ─────────────────────          ────────             ─────────          │
//! │  null / missing          ──►    Null          ──►    None               │
//! │  true / false            ──►    Integer(1/0)  ──►    Some(true/false)   │
//! │  "2024-01-15" (date col) ──►    Text(ISO)                               │
//! │  1705312200000 (date col)──►    Text(ISO)                               │
//! │  42                      ──►    Integer(42)                             │
//! │  4.5                     ──►    Real(4.5)                               │
//! │  "Jane"                  ──►    Text("Jane")                            │
//! │  {..} / [..]             ──►    Text(JSON)    ──►    safe_parse_json    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Totality
//! Every function here is total: it never panics and never returns an
//! error. Bad input collapses to `None` (or the caller's fallback). A record
//! with a garbage date migrates with a NULL date instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest absolute millisecond timestamp a legacy `Date` can hold (±100M days).
const MAX_TIMESTAMP_MS: f64 = 8.64e15;

/// Formats accepted for date strings with a numeric offset (`+02:00`, `+0200`).
const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];

/// Naive formats accepted for date strings without an offset (read as UTC).
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// String values that [`bool_to_sqlite`] stores as `0`.
const FALSY_STRINGS: &[&str] = &["", "false", "0", "no", "null"];

// =============================================================================
// SqlValue
// =============================================================================

/// A value as SQLite stores it.
///
/// Closed sum type: every migrated field ends up as exactly one of these,
/// so binding a row never needs dynamic dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Integer)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Text)
    }
}

// =============================================================================
// Dates
// =============================================================================

/// Formats a UTC timestamp the way the legacy store's `toISOString` did:
/// `2024-01-15T10:30:00.000Z`.
pub fn datetime_to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Converts a date-like value to a canonical ISO-8601 string.
///
/// ## Accepted Input
/// - Strings: RFC 3339, RFC 2822, `YYYY-MM-DD[ T]HH:MM[:SS[.fff]]` followed
///   by `Z`, `+HH:MM`, `+HHMM` or nothing (UTC), and `YYYY-MM-DD`, `YYYY-MM`,
///   `YYYY` (midnight UTC)
/// - Numbers: finite millisecond Unix timestamps
///
/// ## Returns `None` For
/// Blank or unparseable strings, NaN/±Infinity (not representable in JSON but
/// guarded anyway), out-of-range timestamps, and every non-date-like type
/// (null, bool, array, object).
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use tessera_core::convert::to_iso_string;
///
/// assert_eq!(
///     to_iso_string(&json!("2024-01-15")).as_deref(),
///     Some("2024-01-15T00:00:00.000Z")
/// );
/// assert_eq!(to_iso_string(&json!("   ")), None);
/// assert_eq!(to_iso_string(&json!(true)), None);
/// ```
pub fn to_iso_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => parse_datetime(s).map(datetime_to_iso),
        Value::Number(n) => n.as_f64().and_then(millis_to_datetime).map(datetime_to_iso),
        _ => None,
    }
}

fn millis_to_datetime(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_TIMESTAMP_MS {
        return None;
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
}

/// Parses a date string in any accepted format (see [`to_iso_string`]).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // `Z` is spelled as an offset so the minute-precision forms accept it too
    let zoned = match s.strip_suffix(&['Z', 'z'][..]) {
        Some(rest) => format!("{}+00:00", rest),
        None => s.to_string(),
    };
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&zoned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    parse_date_only(s).map(|naive| naive.and_utc())
}

/// `YYYY-MM-DD`, `YYYY-MM` and `YYYY`, at midnight UTC on the first missing day.
fn parse_date_only(s: &str) -> Option<NaiveDateTime> {
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());

    let full = match s.len() {
        10 => s.to_string(),
        7 if s.get(..4).map_or(false, is_digits) && s.as_bytes()[4] == b'-' => {
            format!("{}-01", s)
        }
        4 if is_digits(s) => format!("{}-01-01", s),
        _ => return None,
    };

    NaiveDate::parse_from_str(&full, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// =============================================================================
// Booleans
// =============================================================================

/// Converts any value to SQLite's boolean representation.
///
/// ## Rules
/// ```text
/// null              → None   (absence is preserved, never coerced to false)
/// bool              → 0 / 1
/// number            → 0 if == 0, else 1
/// string            → 0 for "", "false", "0", "no", "null" (trimmed,
///                     case-insensitive), else 1
/// array / object    → 1 (truthy)
/// ```
///
/// The string/number asymmetry is load-bearing: downstream queries filter
/// with `WHERE col = 1`, so `"yes"` must land as `1` and `"no"` as `0`.
pub fn bool_to_sqlite(value: &Value) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => {
            let zero = n.as_f64().map_or(false, |f| f == 0.0);
            Some(if zero { 0 } else { 1 })
        }
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            Some(if FALSY_STRINGS.contains(&lowered.as_str()) { 0 } else { 1 })
        }
        Value::Array(_) | Value::Object(_) => Some(1),
    }
}

/// Reads a stored boolean back.
///
/// `Null` → `None` distinguishes "never stored" from "stored false". Only a
/// numeric `1` is true; every other stored value is false.
pub fn sqlite_to_bool(value: &SqlValue) -> Option<bool> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(i) => Some(*i == 1),
        SqlValue::Real(f) => Some(*f == 1.0),
        SqlValue::Text(_) => Some(false),
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Parses stored JSON text, falling back on absence or garbage.
///
/// ## Example
/// ```rust
/// use tessera_core::convert::safe_parse_json;
///
/// let tags: Vec<String> = safe_parse_json(Some(r#"["vip"]"#), Vec::new());
/// assert_eq!(tags, vec!["vip".to_string()]);
///
/// let tags: Vec<String> = safe_parse_json(Some("{oops"), Vec::new());
/// assert!(tags.is_empty());
/// ```
pub fn safe_parse_json<T: DeserializeOwned>(text: Option<&str>, fallback: T) -> T {
    match text {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(s).unwrap_or(fallback),
        _ => fallback,
    }
}

/// Serializes a value to JSON text for a TEXT column.
///
/// JSON `null` maps to `None` (SQL NULL). Values serde cannot represent
/// (e.g. maps keyed by tuples) also map to `None`: the field is dropped
/// rather than failing the record.
pub fn to_json_string<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    match serde_json::to_value(value) {
        Ok(Value::Null) | Err(_) => None,
        Ok(v) => serde_json::to_string(&v).ok(),
    }
}

// =============================================================================
// Field Names
// =============================================================================

/// Converts a camelCase field name to a snake_case column name.
///
/// ```rust
/// use tessera_core::convert::camel_to_snake;
///
/// assert_eq!(camel_to_snake("firstName"), "first_name");
/// assert_eq!(camel_to_snake("clientID"), "client_id");
/// assert_eq!(camel_to_snake("sync_status"), "sync_status");
/// ```
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_uppercase() {
            out.push(c);
            continue;
        }

        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        let next = chars.get(i + 1).copied();
        let boundary = match prev {
            Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
            // End of an acronym: "HTTPServer" → "http_server"
            Some(p) if p.is_uppercase() => next.map_or(false, |n| n.is_lowercase()),
            _ => false,
        };

        if boundary && !out.ends_with('_') {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }

    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_iso_from_valid_inputs() {
        assert_eq!(
            to_iso_string(&json!("2024-01-15T10:30:00Z")).as_deref(),
            Some("2024-01-15T10:30:00.000Z")
        );
        assert_eq!(
            to_iso_string(&json!("2024-01-15T12:30:00+02:00")).as_deref(),
            Some("2024-01-15T10:30:00.000Z")
        );
        assert_eq!(
            to_iso_string(&json!("2024-01-15 10:30:00")).as_deref(),
            Some("2024-01-15T10:30:00.000Z")
        );
        assert_eq!(
            to_iso_string(&json!("2024-01-15")).as_deref(),
            Some("2024-01-15T00:00:00.000Z")
        );
        assert_eq!(
            to_iso_string(&json!(0)).as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
        assert_eq!(
            to_iso_string(&json!(1705314600000_i64)).as_deref(),
            Some("2024-01-15T10:30:00.000Z")
        );
        assert_eq!(
            to_iso_string(&json!(1705314600123.9)).as_deref(),
            Some("2024-01-15T10:30:00.123Z")
        );
    }

    #[test]
    fn test_iso_from_short_and_offset_forms() {
        let cases = [
            ("2024-01-15T10:30Z", "2024-01-15T10:30:00.000Z"),
            ("2024-01-15T10:30z", "2024-01-15T10:30:00.000Z"),
            ("2024-01-15T12:30+02:00", "2024-01-15T10:30:00.000Z"),
            ("2024-01-15T12:30+0200", "2024-01-15T10:30:00.000Z"),
            ("2024-01-15T10:30:00.000+0000", "2024-01-15T10:30:00.000Z"),
            ("2024-01-15 08:30:00-0200", "2024-01-15T10:30:00.000Z"),
            ("2024-01-15T10:30", "2024-01-15T10:30:00.000Z"),
            ("2024-01", "2024-01-01T00:00:00.000Z"),
            ("2024", "2024-01-01T00:00:00.000Z"),
        ];

        for (input, expected) in cases {
            assert_eq!(to_iso_string(&json!(input)).as_deref(), Some(expected), "{}", input);
        }
    }

    #[test]
    fn test_iso_rejects_invalid_inputs() {
        assert_eq!(to_iso_string(&json!("2024-1")), None);
        assert_eq!(to_iso_string(&json!("12345")), None);
        assert_eq!(to_iso_string(&json!("202é-1")), None);
        assert_eq!(to_iso_string(&json!("")), None);
        assert_eq!(to_iso_string(&json!("   \t")), None);
        assert_eq!(to_iso_string(&json!("not a date")), None);
        assert_eq!(to_iso_string(&json!("2024-13-45")), None);
        assert_eq!(to_iso_string(&json!(null)), None);
        assert_eq!(to_iso_string(&json!(true)), None);
        assert_eq!(to_iso_string(&json!([2024, 1, 15])), None);
        assert_eq!(to_iso_string(&json!({"year": 2024})), None);
        assert_eq!(to_iso_string(&json!(9.0e15)), None);
    }

    #[test]
    fn test_non_finite_millis_rejected() {
        assert!(millis_to_datetime(f64::NAN).is_none());
        assert!(millis_to_datetime(f64::INFINITY).is_none());
        assert!(millis_to_datetime(f64::NEG_INFINITY).is_none());
    }

    #[test]
    fn test_bool_to_sqlite() {
        assert_eq!(bool_to_sqlite(&json!(null)), None);
        assert_eq!(bool_to_sqlite(&json!(true)), Some(1));
        assert_eq!(bool_to_sqlite(&json!(false)), Some(0));
        assert_eq!(bool_to_sqlite(&json!(0)), Some(0));
        assert_eq!(bool_to_sqlite(&json!(0.0)), Some(0));
        assert_eq!(bool_to_sqlite(&json!(2)), Some(1));
        assert_eq!(bool_to_sqlite(&json!(-1)), Some(1));

        for falsy in ["", "false", "FALSE", " No ", "0", "null"] {
            assert_eq!(bool_to_sqlite(&json!(falsy)), Some(0), "{falsy:?}");
        }
        for truthy in ["true", "yes", "1", "off", "anything"] {
            assert_eq!(bool_to_sqlite(&json!(truthy)), Some(1), "{truthy:?}");
        }

        assert_eq!(bool_to_sqlite(&json!([])), Some(1));
        assert_eq!(bool_to_sqlite(&json!({})), Some(1));
    }

    #[test]
    fn test_sqlite_to_bool() {
        assert_eq!(sqlite_to_bool(&SqlValue::Null), None);
        assert_eq!(sqlite_to_bool(&SqlValue::Integer(1)), Some(true));
        assert_eq!(sqlite_to_bool(&SqlValue::Real(1.0)), Some(true));
        assert_eq!(sqlite_to_bool(&SqlValue::Integer(0)), Some(false));
        assert_eq!(sqlite_to_bool(&SqlValue::Integer(2)), Some(false));
        assert_eq!(sqlite_to_bool(&SqlValue::Text("1".into())), Some(false));
    }

    #[test]
    fn test_bool_round_trip() {
        for b in [true, false] {
            let stored = SqlValue::from(bool_to_sqlite(&json!(b)));
            assert_eq!(sqlite_to_bool(&stored), Some(b));
        }
        let stored = SqlValue::from(bool_to_sqlite(&json!(null)));
        assert_eq!(sqlite_to_bool(&stored), None);
    }

    #[test]
    fn test_safe_parse_json_fallbacks() {
        assert_eq!(safe_parse_json::<i32>(None, 7), 7);
        assert_eq!(safe_parse_json::<i32>(Some(""), 7), 7);
        assert_eq!(safe_parse_json::<i32>(Some("  "), 7), 7);
        assert_eq!(safe_parse_json::<i32>(Some("nope"), 7), 7);
        assert_eq!(safe_parse_json::<i32>(Some("42"), 7), 42);
    }

    #[test]
    fn test_to_json_string() {
        assert_eq!(to_json_string(&json!(null)), None);
        assert_eq!(to_json_string(&Option::<i32>::None), None);
        assert_eq!(to_json_string(&json!({"a": 1})).as_deref(), Some(r#"{"a":1}"#));

        let mut unrepresentable = HashMap::new();
        unrepresentable.insert((1, 2), "tuple key");
        assert_eq!(to_json_string(&unrepresentable), None);
    }

    #[test]
    fn test_json_round_trip() {
        let values = [
            json!({"tags": ["vip", "regular"], "visits": 12, "notes": null}),
            json!([1, "two", 3.5, false]),
            json!("plain"),
            json!(0),
        ];
        for v in values {
            let text = to_json_string(&v);
            assert_eq!(safe_parse_json(text.as_deref(), json!("fallback")), v);
        }

        let mut prefs = BTreeMap::new();
        prefs.insert("theme".to_string(), "dark".to_string());
        let text = to_json_string(&prefs);
        let back: BTreeMap<String, String> = safe_parse_json(text.as_deref(), BTreeMap::new());
        assert_eq!(back, prefs);
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("firstName"), "first_name");
        assert_eq!(camel_to_snake("createdAt"), "created_at");
        assert_eq!(camel_to_snake("clientID"), "client_id");
        assert_eq!(camel_to_snake("isVIPMember"), "is_vip_member");
        assert_eq!(camel_to_snake("address2Line"), "address2_line");
        assert_eq!(camel_to_snake("id"), "id");
        assert_eq!(camel_to_snake("sync_status"), "sync_status");
        assert_eq!(camel_to_snake("Name"), "name");
    }
}
