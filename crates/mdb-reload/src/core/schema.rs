//! Schema and metadata types for source and destination tables.
//!
//! These types are produced once per run by the source catalog reader and the
//! destination column resolvers, and consumed by the reconciler and loader.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Row;

/// Name prefix SQLite reserves for its own objects (`sqlite_stat1`,
/// `sqlite_stat4`, `sqlite_sequence`). Never replicated.
pub const SQLITE_INTERNAL_PREFIX: &str = "sqlite_";

/// Whether a table belongs to SQLite itself rather than the application.
pub fn is_internal_table(name: &str) -> bool {
    name.starts_with(SQLITE_INTERNAL_PREFIX)
}

/// A source table and the script that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Table name (case-sensitive, unique within the source).
    pub name: String,

    /// `CREATE TABLE` statement from the source catalog.
    pub create_script: String,
}

/// A source index and the script that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Name of the table the index belongs to.
    pub table_name: String,

    /// `CREATE INDEX` statement from the source catalog.
    pub create_script: String,
}

/// Normalized column type used when synthesizing DDL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Integer,
    Text,
    /// Any other declared type, kept verbatim.
    Other(String),
}

impl PrimitiveType {
    /// Classify a declared column type.
    pub fn from_declared(declared: &str) -> Self {
        let trimmed = declared.trim();
        if trimmed.eq_ignore_ascii_case("INTEGER") {
            PrimitiveType::Integer
        } else if trimmed.eq_ignore_ascii_case("TEXT") {
            PrimitiveType::Text
        } else {
            PrimitiveType::Other(trimmed.to_string())
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Integer => f.write_str("INTEGER"),
            PrimitiveType::Text => f.write_str("TEXT"),
            PrimitiveType::Other(name) => f.write_str(name),
        }
    }
}

/// One column of a source or destination table.
///
/// Columns are compared by name only; type and nullability feed DDL
/// synthesis and value coercion, never drift detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Type name exactly as the catalog reports it.
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    /// Normalized type of this column.
    pub fn primitive_type(&self) -> PrimitiveType {
        PrimitiveType::from_declared(&self.data_type)
    }
}

/// Fully materialized rows of one source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Source table name (without any destination prefix).
    pub name: String,

    /// Source columns in catalog order; every row follows this order.
    pub columns: Vec<ColumnDescriptor>,

    /// All rows of the table.
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// One line per column with name, type and nullability, for diagnostics.
    pub fn describe_columns(&self) -> String {
        self.columns
            .iter()
            .map(|c| {
                format!(
                    "{} {} {}",
                    c.name,
                    c.data_type,
                    if c.nullable { "NULL" } else { "NOT NULL" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Everything read from one source database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCatalog {
    /// Tables sorted by name, SQLite internal tables excluded.
    pub tables: Vec<TableRecord>,

    /// Indexes with a non-null creation script.
    pub indexes: Vec<IndexRecord>,

    /// One snapshot per entry of `tables`, same order.
    pub snapshots: Vec<TableSnapshot>,
}

impl SourceCatalog {
    /// Index scripts belonging to a table, in catalog order.
    pub fn index_scripts<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.indexes
            .iter()
            .filter(move |i| i.table_name == table)
            .map(|i| i.create_script.as_str())
    }

    pub fn snapshot(&self, table: &str) -> Option<&TableSnapshot> {
        self.snapshots.iter().find(|s| s.name == table)
    }
}
