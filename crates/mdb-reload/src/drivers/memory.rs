//! In-memory destination used by tests.
//!
//! Understands the statements the reloader issues (`TRUNCATE TABLE` and
//! `ALTER TABLE ... ADD`) in MySQL quoting, and records everything executed.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::mapping::ColumnMapping;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::{Dialect, Destination};
use crate::core::value::{Row, SqlValue};
use crate::drivers::MysqlDialect;
use crate::error::{MigrateError, Result};

#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

#[derive(Default)]
pub(crate) struct MemoryDestination {
    dialect: MysqlDialect,
    pub tables: BTreeMap<String, MemoryTable>,
    pub executed: Vec<String>,
    pub load_attempts: Vec<String>,
    /// Columns whose `ADD` fails.
    pub reject_columns: HashSet<String>,
    /// Tables whose bulk load always fails.
    pub failing_tables: HashSet<String>,
    /// Every bulk load fails as if local infile were disabled.
    pub refuse_bulk_load: bool,
    /// Tables whose bulk load never completes.
    pub stalled_tables: HashSet<String>,
    pub unreachable: bool,
    /// `reconnect` fails and leaves the destination unreachable.
    pub refuse_reconnect: bool,
    pub reconnects: usize,
    pub closed: bool,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(n, t)| ColumnDescriptor::new(*n, *t, true))
            .collect();
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .get(table)
            .map(|t| t.rows.as_slice())
            .unwrap_or_default()
    }

    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn alters(&self) -> Vec<&str> {
        self.executed
            .iter()
            .filter(|s| s.starts_with("ALTER TABLE"))
            .map(String::as_str)
            .collect()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            Err(MigrateError::connection("connection refused", "memory destination"))
        } else {
            Ok(())
        }
    }
}

fn unquote(ident: &str) -> String {
    ident.trim_matches('`').replace("``", "`")
}

/// Table name of a possibly schema-qualified identifier.
fn table_name(qualified: &str) -> String {
    unquote(qualified.trim().rsplit("`.`").next().unwrap_or_default())
}

#[async_trait]
impl Destination for MemoryDestination {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn engine(&self) -> &str {
        "memory"
    }

    async fn list_tables(&mut self, _schema: &str) -> Result<Vec<String>> {
        self.check_reachable()?;
        Ok(self.tables.keys().cloned().collect())
    }

    async fn resolve_columns(
        &mut self,
        _schema: &str,
        table: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>> {
        self.check_reachable()?;
        Ok(self.tables.get(table).map(|t| t.columns.clone()))
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.check_reachable()?;
        self.executed.push(sql.to_string());

        if let Some(rest) = sql.strip_prefix("TRUNCATE TABLE ") {
            let table = table_name(rest);
            return match self.tables.get_mut(&table) {
                Some(t) => {
                    t.rows.clear();
                    Ok(())
                }
                None => Err(MigrateError::TableNotFound(table)),
            };
        }

        if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let (table, column_def) = rest
                .split_once(" ADD ")
                .ok_or_else(|| MigrateError::transfer("?", format!("bad statement: {}", sql)))?;
            let mut parts = column_def.split_whitespace();
            let name = unquote(parts.next().unwrap_or_default());
            let data_type = parts.next().unwrap_or_default().to_string();
            let nullable = !column_def.ends_with("NOT NULL");

            if self.reject_columns.contains(&name) {
                return Err(MigrateError::transfer(
                    table_name(table),
                    format!("cannot add column {}", name),
                ));
            }
            let table = table_name(table);
            return match self.tables.get_mut(&table) {
                Some(t) => {
                    t.columns.push(ColumnDescriptor::new(name, data_type, nullable));
                    Ok(())
                }
                None => Err(MigrateError::TableNotFound(table)),
            };
        }

        Ok(())
    }

    async fn bulk_load(
        &mut self,
        _schema: &str,
        table: &str,
        mapping: &ColumnMapping,
        rows: &[Row],
    ) -> Result<u64> {
        self.check_reachable()?;
        self.load_attempts.push(table.to_string());

        if self.refuse_bulk_load {
            return Err(MigrateError::LocalInfileDisabled("3948".into()));
        }
        if self.failing_tables.contains(table) {
            return Err(MigrateError::transfer(table, "simulated failure"));
        }
        if self.stalled_tables.contains(table) {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }

        let stored = self
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::TableNotFound(table.to_string()))?;
        for row in rows {
            stored.rows.push(
                mapping
                    .project(row)
                    .map(|v| v.cloned().unwrap_or(SqlValue::Null))
                    .collect(),
            );
        }
        Ok(rows.len() as u64)
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        if self.refuse_reconnect {
            self.unreachable = true;
        }
        self.check_reachable()
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
