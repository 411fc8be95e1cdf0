//! SQL value types held in table snapshots.
//!
//! Values mirror SQLite's storage classes. The declared column type in the
//! source catalog is advisory only; each value keeps the class it was stored
//! with, and destination writers coerce it to the target column type.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A single cell of a snapshot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit floating point.
    Real(f64),

    /// UTF-8 text.
    Text(String),

    /// Raw bytes.
    Blob(Vec<u8>),
}

/// One materialized row, in source column order.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Storage class name, as SQLite reports it.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Blob(_) => "BLOB",
        }
    }

    /// Render as text, for writers that only accept character data.
    ///
    /// Returns `None` for NULL. Blobs are decoded lossily as UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(i) => Some(Cow::Owned(i.to_string())),
            SqlValue::Real(f) => Some(Cow::Owned(f.to_string())),
            SqlValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            SqlValue::Blob(b) => Some(String::from_utf8_lossy(b)),
        }
    }

    /// Interpret as an integer, parsing text. Reals convert only when they
    /// hold an exact integer within range.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Real(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret as a float, parsing text.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Real(f) => Some(*f),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}
