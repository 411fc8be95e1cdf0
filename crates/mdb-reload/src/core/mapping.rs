//! Alignment of snapshot columns onto a destination table.
//!
//! Bulk writers emit values in destination column order. A [`ColumnMapping`]
//! records, for every destination column, which snapshot column feeds it.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

use super::schema::ColumnDescriptor;
use super::value::SqlValue;

/// How snapshot columns are matched to destination columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    /// Match by column name; destination order wins.
    ByName,
    /// Match by position; names are ignored.
    Positional,
}

/// Destination columns paired with the snapshot column that feeds each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Destination columns in destination order.
    pub columns: Vec<ColumnDescriptor>,

    /// Snapshot column index per destination column. `None` leaves the
    /// destination column to its default (or NULL).
    pub sources: Vec<Option<usize>>,
}

impl ColumnMapping {
    /// Build a mapping of `source` columns onto `destination` columns.
    ///
    /// Fails with [`MigrateError::ColumnMapping`] when a snapshot column has
    /// nowhere to go.
    pub fn build(
        alignment: Alignment,
        table: &str,
        destination: &[ColumnDescriptor],
        source: &[ColumnDescriptor],
    ) -> Result<Self> {
        match alignment {
            Alignment::ByName => Self::by_name(table, destination, source),
            Alignment::Positional => Self::positional(table, destination, source),
        }
    }

    fn by_name(
        table: &str,
        destination: &[ColumnDescriptor],
        source: &[ColumnDescriptor],
    ) -> Result<Self> {
        let unmatched: Vec<String> = source
            .iter()
            .filter(|s| !destination.iter().any(|d| d.name == s.name))
            .map(|s| s.name.clone())
            .collect();

        if !unmatched.is_empty() {
            return Err(MigrateError::ColumnMapping {
                table: table.to_string(),
                columns: unmatched,
            });
        }

        let sources = destination
            .iter()
            .map(|d| source.iter().position(|s| s.name == d.name))
            .collect();

        Ok(Self {
            columns: destination.to_vec(),
            sources,
        })
    }

    fn positional(
        table: &str,
        destination: &[ColumnDescriptor],
        source: &[ColumnDescriptor],
    ) -> Result<Self> {
        if source.len() > destination.len() {
            return Err(MigrateError::ColumnMapping {
                table: table.to_string(),
                columns: source[destination.len()..]
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            });
        }

        let sources = (0..destination.len())
            .map(|i| (i < source.len()).then_some(i))
            .collect();

        Ok(Self {
            columns: destination.to_vec(),
            sources,
        })
    }

    /// Destination columns that receive a snapshot value, with the index of
    /// that value in a snapshot row.
    pub fn mapped(&self) -> impl Iterator<Item = (&ColumnDescriptor, usize)> {
        self.columns
            .iter()
            .zip(&self.sources)
            .filter_map(|(col, src)| src.map(|idx| (col, idx)))
    }

    /// Values of `row` in destination order; `None` for unmapped columns.
    pub fn project<'a>(&'a self, row: &'a [SqlValue]) -> impl Iterator<Item = Option<&'a SqlValue>> {
        self.sources
            .iter()
            .map(move |src| src.and_then(|idx| row.get(idx)))
    }
}
