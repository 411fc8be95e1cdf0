//! Schema drift reconciliation.
//!
//! Source tables that do not exist in the destination are never created
//! automatically; their scripts are surfaced so an operator can apply them.
//! Known tables whose destination is missing source columns get those
//! columns added with `ALTER TABLE ... ADD`.
//!
//! Columns are compared by name only. Type and nullability differences on
//! columns present on both sides are left alone.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::schema::{ColumnDescriptor, SourceCatalog, TableSnapshot};
use crate::core::traits::{Destination, Dialect};
use crate::error::{MigrateError, Result};

/// A source table with no counterpart in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownTable {
    /// Table name in the destination, prefix included.
    pub name: String,

    /// `CREATE TABLE` script from the source.
    pub create_script: String,

    /// `CREATE INDEX` scripts from the source, in catalog order.
    pub index_scripts: Vec<String>,
}

/// Source tables split by whether the destination already has them.
#[derive(Debug)]
pub struct TablePartition<'a> {
    /// Snapshots to reload, with their destination table name, by name.
    pub load: Vec<(String, &'a TableSnapshot)>,

    /// Tables that must be created by hand before they can be loaded.
    pub unknown: Vec<UnknownTable>,
}

/// Split the catalog into tables to reload and tables unknown to the
/// destination. `existing` holds the destination's table names; source
/// names are matched after prepending `prefix`.
pub fn partition_tables<'a>(
    catalog: &'a SourceCatalog,
    existing: &[String],
    prefix: &str,
) -> TablePartition<'a> {
    let mut load = Vec::new();
    let mut unknown = Vec::new();

    let mut tables: Vec<_> = catalog.tables.iter().collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));

    for table in tables {
        let name = format!("{}{}", prefix, table.name);
        if existing.iter().any(|e| *e == name) {
            if let Some(snapshot) = catalog.snapshot(&table.name) {
                load.push((name, snapshot));
            }
        } else {
            unknown.push(UnknownTable {
                name,
                create_script: table.create_script.clone(),
                index_scripts: catalog
                    .index_scripts(&table.name)
                    .map(str::to_string)
                    .collect(),
            });
        }
    }

    TablePartition { load, unknown }
}

/// A column to add and the statement that adds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAddition {
    pub column: String,
    pub statement: String,
}

/// Plan `ALTER TABLE ... ADD` statements for source columns the destination
/// lacks, in source column order.
///
/// Every statement is synthesized before any is returned, so a column of an
/// unmapped type fails with [`MigrateError::UnhandledType`] before anything
/// is altered.
pub fn plan_missing_columns(
    dialect: &dyn Dialect,
    schema: &str,
    table: &str,
    source: &[ColumnDescriptor],
    destination: &[ColumnDescriptor],
) -> Result<Vec<ColumnAddition>> {
    let qualified = dialect.qualify_table(schema, table);

    source
        .iter()
        .filter(|s| !destination.iter().any(|d| d.name == s.name))
        .map(|column| {
            let target_type = dialect.map_type(&column.primitive_type()).ok_or_else(|| {
                MigrateError::UnhandledType {
                    table: table.to_string(),
                    column: column.name.clone(),
                    data_type: column.data_type.clone(),
                }
            })?;
            Ok(ColumnAddition {
                column: column.name.clone(),
                statement: dialect.build_add_column(&qualified, column, target_type),
            })
        })
        .collect()
}

/// Result of reconciling one table's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// Destination already had every source column.
    UpToDate,

    /// These columns were added, in order.
    ColumnsAdded(Vec<String>),

    /// Drift could not be fixed; the reason is kept for the report.
    Unresolved(String),
}

impl ReconciliationOutcome {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, ReconciliationOutcome::Unresolved(_))
    }
}

/// Add the source columns missing from a destination table.
///
/// Stops at the first failed `ADD`; columns added before it stay added.
/// Only fatal errors are returned as `Err`.
pub async fn reconcile_columns(
    dest: &mut dyn Destination,
    schema: &str,
    table: &str,
    snapshot: &TableSnapshot,
) -> Result<ReconciliationOutcome> {
    let destination_columns = match dest.resolve_columns(schema, table).await {
        Ok(Some(columns)) => columns,
        Ok(None) => {
            warn!("Table {} not found in {}, skipping column check", table, dest.engine());
            return Ok(ReconciliationOutcome::Unresolved(format!(
                "table {} does not exist",
                table
            )));
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("Could not read columns of {}: {}", table, e);
            return Ok(ReconciliationOutcome::Unresolved(e.to_string()));
        }
    };

    let additions = plan_missing_columns(
        dest.dialect(),
        schema,
        table,
        &snapshot.columns,
        &destination_columns,
    )?;
    if additions.is_empty() {
        return Ok(ReconciliationOutcome::UpToDate);
    }

    let mut added = Vec::with_capacity(additions.len());
    for addition in additions {
        info!("{}", addition.statement);
        if let Err(e) = dest.execute(&addition.statement).await {
            if e.is_fatal() {
                return Err(e);
            }
            error!("Failed to add column {}.{}: {}", table, addition.column, e);
            error!("Statement: {}", addition.statement);
            return Ok(ReconciliationOutcome::Unresolved(format!(
                "adding column {} failed: {}",
                addition.column, e
            )));
        }
        added.push(addition.column);
    }

    Ok(ReconciliationOutcome::ColumnsAdded(added))
}
