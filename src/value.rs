//! Raw values, typecasting, and SQL-literal rendering.
//!
//! Every field value moving through the crate is a [`Value`]. The codec in
//! this module is responsible for two conversions:
//!
//! - **Typecasting**: coercing a raw value to a declared field type
//!   ([`FieldType`](crate::schema::FieldType)) when a record is read or
//!   validated.
//! - **Rendering**: turning a value into a SQL literal for a compiled
//!   statement. Rendering is the only path by which values reach SQL text,
//!   and [`escape_text`] is the sole injection defense, so every text
//!   literal must go through it.

use crate::schema::FieldType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The zero-date literal used for unset datetime columns.
pub const ZERO_DATETIME: &str = "0000-00-00 00:00:00";

/// The zero-time literal used for unset time columns.
pub const ZERO_TIME: &str = "00:00:00";

/// A raw field value.
///
/// `Value` is deliberately loose: records carry whatever the row or the
/// caller supplied, and the schema's declared type is applied on access via
/// [`typecast`]. Serialization is untagged so cached rows round-trip as
/// plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The absence of a value (SQL NULL).
    Null,
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A text value.
    Text(String),
}

impl Value {
    /// Returns true when the value reads as empty text.
    ///
    /// This is the emptiness test the validation layer applies to mandatory
    /// fields: NULL and the empty string are empty, everything else
    /// (including `0`) is not.
    #[must_use]
    pub fn is_empty_text(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Loose truth test used for flag fields and boolean rendering.
    ///
    /// NULL, `false`, `0`, `0.0`, the empty string, and the string `"0"`
    /// are false; everything else is true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty() && s != "0",
        }
    }

    /// Coerces the value to an integer.
    ///
    /// Text is parsed leniently: leading whitespace is skipped and the
    /// longest leading `[+-]?digits` run is taken, so `"12abc"` is 12 and
    /// `"3.9"` is 3. Unparseable text, NULL, and non-finite floats coerce
    /// to 0.
    #[must_use]
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Null => 0,
            Self::Bool(b) => i64::from(*b),
            Self::Int(i) => *i,
            Self::Float(f) => {
                if f.is_finite() {
                    *f as i64
                } else {
                    0
                }
            },
            Self::Text(s) => parse_leading_int(s),
        }
    }

    /// Coerces the value to a float, tolerating a locale decimal comma in
    /// text (`"1,5"` parses as 1.5). Non-finite results collapse to 0.
    #[must_use]
    pub fn as_float(&self) -> f64 {
        let f = match self {
            Self::Null => 0.0,
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            },
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        };
        if f.is_finite() { f } else { 0.0 }
    }

    /// Renders the value as plain text (no quoting).
    ///
    /// NULL becomes the empty string; booleans become `"1"` / `""`.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => {
                if *b {
                    "1".to_string()
                } else {
                    String::new()
                }
            },
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// An ordered field-name → value map.
///
/// Used for caller-supplied set maps, validated set maps, and result rows.
/// Order is preserved: validated maps follow the schema's field order and
/// rows follow the statement's column order. Inserting an existing key
/// replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetMap {
    entries: Vec<(String, Value)>,
}

impl SetMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a value, replacing any existing entry for the field in
    /// place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == field) {
            entry.1 = value;
        } else {
            self.entries.push((field, value));
        }
    }

    /// Builder-style insert for fixture construction.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Returns true when the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SetMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (field, value) in iter {
            map.insert(field, value);
        }
        map
    }
}

/// Typecasts a raw value to a declared field type.
///
/// Text fields pass any value through as its text rendering; integer
/// fields coerce via [`Value::as_int`]. The declared-type enum is closed,
/// so there is no unsupported-type error path.
#[must_use]
pub fn typecast(value: &Value, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Text => Value::Text(value.to_text()),
        FieldType::Int => Value::Int(value.as_int()),
    }
}

/// The SQL representation a value should be rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlKind {
    /// Integer literal.
    Int,
    /// Float literal.
    Float,
    /// `TRUE` / `FALSE` literal.
    Bool,
    /// Quoted `YYYY-MM-DD HH:MM:SS` literal.
    Date,
    /// Quoted `HH:MM:SS` literal.
    Time,
    /// Quoted `YYYY-MM-DD HH:MM:SS` literal.
    DateTime,
    /// Escaped, quoted text literal.
    Text,
}

/// Renders a value as a SQL literal of the given kind.
///
/// NULL renders as the `NULL` literal; use [`render_or`] to substitute a
/// fallback value instead.
#[must_use]
pub fn render(value: &Value, kind: SqlKind) -> String {
    render_or(value, kind, None)
}

/// Renders a value as a SQL literal, substituting `empty_as` for NULL.
///
/// With no substitute, NULL renders as the SQL `NULL` literal regardless
/// of kind. Date kinds accept either a numeric Unix timestamp (zero or
/// negative renders the zero-date literal) or a parseable string (RFC
/// 3339, `YYYY-MM-DD HH:MM:SS`, or `YYYY-MM-DD`; empty or unparseable
/// strings render the zero-date literal). Everything else falls through to
/// an escaped, quoted text literal.
#[must_use]
pub fn render_or(value: &Value, kind: SqlKind, empty_as: Option<&Value>) -> String {
    if value.is_null() {
        return match empty_as {
            None => "NULL".to_string(),
            Some(substitute) => render_or(substitute, kind, None),
        };
    }

    match kind {
        SqlKind::Int => value.as_int().to_string(),
        SqlKind::Float => value.as_float().to_string(),
        SqlKind::Bool => {
            if value.is_truthy() {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        },
        SqlKind::Date | SqlKind::DateTime => render_datetime(value),
        SqlKind::Time => render_time(value),
        SqlKind::Text => quote_text(&value.to_text()),
    }
}

/// Renders a value by its own runtime type.
///
/// Used for set-map values where no column kind is declared at the call
/// site: integers and floats render as numeric literals, booleans as
/// `TRUE`/`FALSE`, NULL as `NULL`, and text as an escaped quoted string.
#[must_use]
pub fn render_auto(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(_) => render(value, SqlKind::Bool),
        Value::Int(_) => render(value, SqlKind::Int),
        Value::Float(_) => render(value, SqlKind::Float),
        Value::Text(_) => render(value, SqlKind::Text),
    }
}

/// Escapes a string for inclusion in a single-quoted SQL literal by
/// doubling embedded single quotes.
///
/// This is the connection-level escaping rule for `SQLite` (the same
/// transformation its own `quote()` applies), and it is the sole SQL
/// injection defense in the crate: all text reaching compiled SQL must
/// pass through here.
#[must_use]
pub fn escape_text(s: &str) -> String {
    s.replace('\'', "''")
}

/// Escapes and single-quotes a string as a SQL text literal.
#[must_use]
pub fn quote_text(s: &str) -> String {
    format!("'{}'", escape_text(s))
}

/// Current UTC time formatted as a datetime column value.
#[must_use]
pub fn now_datetime() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn render_datetime(value: &Value) -> String {
    let formatted = match value {
        Value::Int(ts) => format_timestamp(*ts),
        Value::Bool(b) => format_timestamp(i64::from(*b)),
        Value::Float(f) => format_timestamp(value_float_to_ts(*f)),
        Value::Text(s) => {
            if s.is_empty() {
                None
            } else {
                parse_datetime(s).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
        },
        Value::Null => None,
    };
    quote_text(&formatted.unwrap_or_else(|| ZERO_DATETIME.to_string()))
}

fn render_time(value: &Value) -> String {
    let formatted = match value {
        Value::Int(ts) => {
            if *ts > 0 {
                Utc.timestamp_opt(*ts, 0)
                    .single()
                    .map(|dt| dt.format("%H:%M:%S").to_string())
            } else {
                None
            }
        },
        Value::Text(s) => parse_time(s).map(|t| t.format("%H:%M:%S").to_string()),
        _ => None,
    };
    quote_text(&formatted.unwrap_or_else(|| ZERO_TIME.to_string()))
}

fn format_timestamp(ts: i64) -> Option<String> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
    } else {
        None
    }
}

fn value_float_to_ts(f: f64) -> i64 {
    if f.is_finite() { f as i64 } else { 0 }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let mut chars = s.char_indices();
    let mut end = 0;
    let mut seen_digit = false;
    if let Some((_, c)) = chars.next() {
        if c.is_ascii_digit() {
            seen_digit = true;
            end = c.len_utf8();
        } else if c == '+' || c == '-' {
            end = c.len_utf8();
        } else {
            return 0;
        }
    }
    for (idx, c) in chars {
        if c.is_ascii_digit() {
            seen_digit = true;
            end = idx + c.len_utf8();
        } else {
            break;
        }
    }
    if !seen_digit {
        return 0;
    }
    s[..end].parse().unwrap_or(0)
}
