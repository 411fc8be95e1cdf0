//! Full-table reload of one snapshot into one destination table.
//!
//! A load always truncates first, then aligns the snapshot's columns with the
//! destination's current column order and bulk writes every row.

use tracing::{debug, error};

use crate::core::mapping::{Alignment, ColumnMapping};
use crate::core::schema::TableSnapshot;
use crate::core::traits::Destination;
use crate::error::{MigrateError, Result};

/// Which attempt a load is. Failures of the first attempt are expected
/// (schema drift) and only logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

/// Target of a single table load.
#[derive(Debug, Clone, Copy)]
pub struct LoadTarget<'a> {
    pub schema: &'a str,
    /// Destination table name, prefix included.
    pub table: &'a str,
    pub alignment: Alignment,
}

impl<'a> LoadTarget<'a> {
    pub fn by_name(schema: &'a str, table: &'a str) -> Self {
        Self {
            schema,
            table,
            alignment: Alignment::ByName,
        }
    }

    pub fn positional(schema: &'a str, table: &'a str) -> Self {
        Self {
            schema,
            table,
            alignment: Alignment::Positional,
        }
    }
}

/// Truncate the table and bulk write the snapshot into it.
///
/// Returns the number of rows written. Errors are always returned; `attempt`
/// only controls how loudly they are logged here.
pub async fn load_table(
    dest: &mut dyn Destination,
    target: LoadTarget<'_>,
    snapshot: &TableSnapshot,
    attempt: Attempt,
) -> Result<u64> {
    let result = try_load(dest, target, snapshot).await;

    if let Err(e) = &result {
        match attempt {
            Attempt::First => {
                debug!("First load of {} failed: {}", target.table, e);
            }
            Attempt::Retry => report_failure(target.table, snapshot, e),
        }
    }

    result
}

async fn try_load(
    dest: &mut dyn Destination,
    target: LoadTarget<'_>,
    snapshot: &TableSnapshot,
) -> Result<u64> {
    dest.truncate(target.schema, target.table).await?;

    let columns = dest
        .resolve_columns(target.schema, target.table)
        .await?
        .ok_or_else(|| MigrateError::TableNotFound(target.table.to_string()))?;

    let mapping = ColumnMapping::build(target.alignment, target.table, &columns, &snapshot.columns)?;

    let written = dest
        .bulk_load(target.schema, target.table, &mapping, &snapshot.rows)
        .await?;
    debug!("Loaded {} rows into {}", written, target.table);
    Ok(written)
}

fn report_failure(table: &str, snapshot: &TableSnapshot, err: &MigrateError) {
    error!("Bulk load into {} failed", table);
    if err.is_column_mapping() {
        error!("{}", err);
        error!("Source columns of {}:\n{}", snapshot.name, snapshot.describe_columns());
    } else {
        error!("{}", err.format_detailed());
    }
}
