//! Core traits for engine-agnostic reloading.
//!
//! - [`Dialect`]: SQL syntax strategy for a destination engine
//! - [`Destination`]: catalog queries, DDL/DML execution and bulk writes
//!   against one live destination connection
//!
//! Each supported engine provides one implementation of both traits; the
//! engine is picked from configuration at startup, never by inspecting
//! connection types at runtime.

use async_trait::async_trait;

use crate::error::Result;

use super::mapping::ColumnMapping;
use super::schema::{ColumnDescriptor, PrimitiveType};
use super::value::Row;

/// SQL syntax strategy for different destination engines.
pub trait Dialect: Send + Sync {
    /// Dialect identifier (e.g., "mysql", "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Qualify a table with its schema. An empty schema leaves the table
    /// unqualified, resolved against the connection's default.
    fn qualify_table(&self, schema: &str, table: &str) -> String {
        if schema.is_empty() {
            self.quote_ident(table)
        } else {
            format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
        }
    }

    /// Destination type used when adding a column of the given source type.
    ///
    /// `None` means the type has no mapping and the column cannot be added.
    fn map_type(&self, ty: &PrimitiveType) -> Option<&'static str>;

    /// Build a `TRUNCATE TABLE` statement.
    fn build_truncate(&self, qualified_table: &str) -> String {
        format!("TRUNCATE TABLE {}", qualified_table)
    }

    /// Build an `ALTER TABLE ... ADD` statement.
    fn build_add_column(
        &self,
        qualified_table: &str,
        column: &ColumnDescriptor,
        target_type: &str,
    ) -> String {
        format!(
            "ALTER TABLE {} ADD {} {} {}",
            qualified_table,
            self.quote_ident(&column.name),
            target_type,
            if column.nullable { "NULL" } else { "NOT NULL" }
        )
    }
}

/// One live destination connection.
///
/// All methods take `&mut self`: a destination is driven by exactly one
/// reconciliation or load operation at a time.
#[async_trait]
pub trait Destination: Send {
    /// SQL dialect of this destination.
    fn dialect(&self) -> &dyn Dialect;

    /// Human readable engine name for diagnostics.
    fn engine(&self) -> &str;

    /// Names of all tables in `schema`.
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>>;

    /// Column metadata for a table, in destination column order.
    ///
    /// Returns `Ok(None)` if the table does not exist.
    async fn resolve_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>>;

    /// Execute a DDL/DML statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Remove every row from a table.
    async fn truncate(&mut self, schema: &str, table: &str) -> Result<()> {
        let dialect = self.dialect();
        let sql = dialect.build_truncate(&dialect.qualify_table(schema, table));
        self.execute(&sql).await
    }

    /// Bulk write `rows` into a table using the given column mapping.
    ///
    /// Returns the number of rows written.
    async fn bulk_load(
        &mut self,
        schema: &str,
        table: &str,
        mapping: &ColumnMapping,
        rows: &[Row],
    ) -> Result<u64>;

    /// Drop the current connection without a graceful shutdown and open a
    /// fresh one with the original settings.
    ///
    /// Used after a table load was abandoned midway, when the protocol state
    /// of the old connection is unknown.
    async fn reconnect(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self);
}
