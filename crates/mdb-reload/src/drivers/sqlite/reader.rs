//! SQLite source reader.
//!
//! Reads table and index scripts from `sqlite_master`, column metadata from
//! `pragma_table_info`, and materializes every table with `SELECT *`.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::core::schema::{
    is_internal_table, ColumnDescriptor, IndexRecord, SourceCatalog, TableRecord, TableSnapshot,
};
use crate::core::value::{Row as ValueRow, SqlValue};
use crate::error::{MigrateError, Result};

/// Read-only handle on one SQLite database file.
pub struct SqliteSource {
    conn: SqliteConnection,
    path: PathBuf,
}

impl SqliteSource {
    /// Open an existing database file read-only.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(MigrateError::SourceFileMissing(path.to_path_buf()));
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);
        let conn = SqliteConnection::connect_with(&opts).await?;

        debug!("Opened source database {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Table records sorted by name, SQLite internal tables excluded.
    pub async fn tables(&mut self) -> Result<Vec<TableRecord>> {
        let rows = sqlx::query(
            "SELECT tbl_name, sql FROM sqlite_master WHERE type = 'table' ORDER BY tbl_name",
        )
        .fetch_all(&mut self.conn)
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            if is_internal_table(&name) {
                continue;
            }
            let create_script: Option<String> = row.try_get(1)?;
            tables.push(TableRecord {
                name,
                create_script: create_script.unwrap_or_default(),
            });
        }
        Ok(tables)
    }

    /// Index records that have a creation script.
    ///
    /// Automatic indexes (for `UNIQUE`/`PRIMARY KEY` constraints) have none
    /// and are left out.
    pub async fn indexes(&mut self) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(
            "SELECT tbl_name, sql FROM sqlite_master \
             WHERE type = 'index' AND sql IS NOT NULL ORDER BY tbl_name, name",
        )
        .fetch_all(&mut self.conn)
        .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let table_name: String = row.try_get(0)?;
            if is_internal_table(&table_name) {
                continue;
            }
            indexes.push(IndexRecord {
                table_name,
                create_script: row.try_get(1)?,
            });
        }
        Ok(indexes)
    }

    /// Columns of a table in declaration order.
    pub async fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(r#"SELECT name, type, "notnull" FROM pragma_table_info(?1)"#)
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let data_type: String = row.try_get(1)?;
                let not_null: i64 = row.try_get(2)?;
                Ok(ColumnDescriptor::new(name, data_type, not_null == 0))
            })
            .collect()
    }

    /// Every row of a table, in storage order.
    pub async fn snapshot(&mut self, table: &str) -> Result<TableSnapshot> {
        let columns = self.columns(table).await?;
        let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
        let rows = sqlx::query(&sql).fetch_all(&mut self.conn).await?;

        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(TableSnapshot::new(table, columns).with_rows(rows))
    }

    /// Read the full catalog: tables, indexes and one snapshot per table.
    pub async fn read_catalog(&mut self) -> Result<SourceCatalog> {
        let tables = self.tables().await?;
        let indexes = self.indexes().await?;

        let mut snapshots = Vec::with_capacity(tables.len());
        for table in &tables {
            let snapshot = self.snapshot(&table.name).await?;
            debug!("Read {} rows from {}", snapshot.row_count(), table.name);
            snapshots.push(snapshot);
        }

        info!(
            "Read {} tables and {} indexes from {}",
            tables.len(),
            indexes.len(),
            self.path.display()
        );

        Ok(SourceCatalog {
            tables,
            indexes,
            snapshots,
        })
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

/// Decode a row by the storage class of each value, ignoring declared types.
fn decode_row(row: &SqliteRow) -> Result<ValueRow> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            values.push(SqlValue::Null);
            continue;
        }
        let value = match raw.type_info().name() {
            "INTEGER" => SqlValue::Integer(row.try_get_unchecked(idx)?),
            "REAL" => SqlValue::Real(row.try_get_unchecked(idx)?),
            "BLOB" => SqlValue::Blob(row.try_get_unchecked(idx)?),
            _ => SqlValue::Text(row.try_get_unchecked(idx)?),
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_fixture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("master.mdb");
        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&opts).await.unwrap();

        for sql in [
            "CREATE TABLE chara_data (id INTEGER NOT NULL PRIMARY KEY, name TEXT, speed REAL)",
            "CREATE INDEX chara_data_0 ON chara_data(name)",
            "CREATE TABLE blobs (id INTEGER, payload BLOB, UNIQUE(id))",
            "INSERT INTO chara_data VALUES (1001, 'Special Week', 1.5)",
            "INSERT INTO chara_data VALUES (1002, NULL, NULL)",
            "INSERT INTO blobs VALUES (1, x'00ff')",
            "INSERT INTO blobs VALUES ('7', 'loose')",
            "CREATE TABLE story (id INTEGER PRIMARY KEY AUTOINCREMENT)",
            "INSERT INTO story DEFAULT VALUES",
            "ANALYZE",
        ] {
            sqlx::query(sql).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_read_catalog() {
        let dir = TempDir::new().unwrap();
        let path = create_fixture(&dir).await;

        let mut source = SqliteSource::open(&path).await.unwrap();
        let catalog = source.read_catalog().await.unwrap();

        // ANALYZE created sqlite_stat1 (and sqlite_stat4 where compiled in),
        // AUTOINCREMENT created sqlite_sequence
        let names: Vec<_> = catalog.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["blobs", "chara_data", "story"]);
        assert!(catalog.snapshots.iter().all(|s| !s.name.starts_with("sqlite_")));
        assert!(catalog.tables[1].create_script.starts_with("CREATE TABLE chara_data"));

        // the UNIQUE autoindex has no script
        assert_eq!(catalog.indexes.len(), 1);
        assert_eq!(catalog.indexes[0].table_name, "chara_data");

        let chara = catalog.snapshot("chara_data").unwrap();
        assert_eq!(chara.columns[0], ColumnDescriptor::new("id", "INTEGER", false));
        assert!(chara.columns[1].nullable);
        assert_eq!(
            chara.rows[0],
            vec![
                SqlValue::Integer(1001),
                SqlValue::from("Special Week"),
                SqlValue::Real(1.5)
            ]
        );
        assert_eq!(
            chara.rows[1],
            vec![SqlValue::Integer(1002), SqlValue::Null, SqlValue::Null]
        );

        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_values_keep_storage_class() {
        let dir = TempDir::new().unwrap();
        let path = create_fixture(&dir).await;

        let mut source = SqliteSource::open(&path).await.unwrap();
        let blobs = source.snapshot("blobs").await.unwrap();
        assert_eq!(blobs.rows[0][1], SqlValue::Blob(vec![0x00, 0xff]));
        // INTEGER affinity converts '7'; BLOB affinity keeps text as text
        assert_eq!(blobs.rows[1][0], SqlValue::Integer(7));
        assert_eq!(blobs.rows[1][1], SqlValue::from("loose"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = SqliteSource::open(dir.path().join("meta")).await.err().unwrap();
        assert!(matches!(err, MigrateError::SourceFileMissing(_)));
        assert!(err.is_fatal());
    }
}
