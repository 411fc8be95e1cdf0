//! SQL Server destination implementation.
//!
//! Uses a single tiberius client over TCP with keepalives and the TDS bulk
//! load protocol for row transfer.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use tiberius::{Client, ColumnData, Config, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::core::mapping::ColumnMapping;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::{Dialect, Destination};
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

use super::MssqlDialect;

/// TCP keepalive interval for SQL Server connections.
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server destination backed by a single tiberius client.
pub struct MssqlDestination {
    client: Option<MssqlClient>,
    connection_string: String,
    dialect: MssqlDialect,
}

impl MssqlDestination {
    /// Connect using an ADO.NET style connection string.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let config = Config::from_ado_string(connection_string.trim()).map_err(|e| {
            MigrateError::Config(format!("invalid SQL Server connection string: {}", e))
        })?;
        let addr = config.get_addr();

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| MigrateError::connection(e, format!("connecting to SQL Server at {}", addr)))?;
        tcp.set_nodelay(true).ok();
        let tcp = with_keepalive(tcp)?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| MigrateError::connection(e, "SQL Server login"))?;

        info!("Connected to SQL Server destination at {}", addr);

        Ok(Self {
            client: Some(client),
            connection_string: connection_string.to_string(),
            dialect: MssqlDialect::new(),
        })
    }

    fn client(&mut self) -> Result<&mut MssqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| MigrateError::connection("connection closed", "SQL Server destination"))
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        let sql = r#"
            SELECT COUNT(*)
            FROM sys.tables t
            JOIN sys.schemas s ON t.schema_id = s.schema_id
            WHERE s.name = @P1 AND t.name = @P2"#;
        let row = self
            .client()?
            .query(sql, &[&schema, &table])
            .await?
            .into_row()
            .await?;
        Ok(row.and_then(|r| r.get::<i32, _>(0)).unwrap_or(0) > 0)
    }
}

fn with_keepalive(tcp: TcpStream) -> Result<TcpStream> {
    let std_tcp = tcp.into_std()?;
    let socket = socket2::Socket::from(std_tcp);

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keepalive on SQL Server connection: {}", e);
    }

    let std_tcp: std::net::TcpStream = socket.into();
    std_tcp.set_nonblocking(true)?;
    Ok(TcpStream::from_std(std_tcp)?)
}

/// Convert a snapshot value into the wire representation expected by
/// `column`.
///
/// Bulk load is strict about types, so SQLite's loosely typed values are
/// coerced here. A non-NULL value the column cannot hold exactly fails the
/// table instead of being stored as NULL or truncated. Non-finite floats
/// become NULL.
pub(crate) fn to_column_data(
    table: &str,
    column: &ColumnDescriptor,
    value: Option<&SqlValue>,
) -> Result<ColumnData<'static>> {
    let value = value.unwrap_or(&SqlValue::Null);
    let null = value.is_null();
    let reject = || {
        MigrateError::transfer(
            table,
            format!(
                "value {} does not fit column {} ({})",
                describe(value),
                column.name,
                column.data_type
            ),
        )
    };

    fn integer<T: TryFrom<i64>>(value: &SqlValue) -> Option<T> {
        value.as_i64().and_then(|v| T::try_from(v).ok())
    }

    let data = match column.data_type.to_ascii_lowercase().as_str() {
        "bigint" if null => ColumnData::I64(None),
        "bigint" => ColumnData::I64(Some(integer(value).ok_or_else(reject)?)),
        "int" if null => ColumnData::I32(None),
        "int" => ColumnData::I32(Some(integer(value).ok_or_else(reject)?)),
        "smallint" if null => ColumnData::I16(None),
        "smallint" => ColumnData::I16(Some(integer(value).ok_or_else(reject)?)),
        "tinyint" if null => ColumnData::U8(None),
        "tinyint" => ColumnData::U8(Some(integer(value).ok_or_else(reject)?)),
        "bit" if null => ColumnData::Bit(None),
        "bit" => ColumnData::Bit(Some(value.as_i64().ok_or_else(reject)? != 0)),
        "float" if null => ColumnData::F64(None),
        "float" => {
            let f = value.as_f64().ok_or_else(reject)?;
            ColumnData::F64(f.is_finite().then_some(f))
        }
        "real" if null => ColumnData::F32(None),
        "real" => {
            let f = value.as_f64().ok_or_else(reject)?;
            if f.is_finite() && f.abs() > f64::from(f32::MAX) {
                return Err(reject());
            }
            ColumnData::F32(f.is_finite().then_some(f as f32))
        }
        "binary" | "varbinary" | "image" => ColumnData::Binary(match value {
            SqlValue::Null => None,
            SqlValue::Blob(b) => Some(Cow::Owned(b.clone())),
            other => other
                .as_text()
                .map(|s| Cow::Owned(s.into_owned().into_bytes())),
        }),
        _ => ColumnData::String(value.as_text().map(|s| Cow::Owned(s.into_owned()))),
    };
    Ok(data)
}

/// Short rendering of a value for error messages.
fn describe(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) if s.chars().count() > 40 => {
            format!("'{}...'", s.chars().take(40).collect::<String>())
        }
        SqlValue::Text(s) => format!("'{}'", s),
        SqlValue::Blob(b) => format!("<{} byte blob>", b.len()),
        other => other.as_text().map(|s| s.into_owned()).unwrap_or_else(|| "NULL".into()),
    }
}

#[async_trait]
impl Destination for MssqlDestination {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn engine(&self) -> &str {
        "SQL Server"
    }

    async fn list_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        let sql = r#"
            SELECT t.name
            FROM sys.tables t
            JOIN sys.schemas s ON t.schema_id = s.schema_id
            WHERE s.name = @P1
            ORDER BY t.name"#;
        let rows = self
            .client()?
            .query(sql, &[&schema])
            .await?
            .into_first_result()
            .await?;

        let tables: Vec<String> = rows
            .iter()
            .filter_map(|r| r.get::<&str, _>(0).map(str::to_string))
            .collect();
        debug!("Found {} tables in SQL Server schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn resolve_columns(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Option<Vec<ColumnDescriptor>>> {
        let sql = r#"
            SELECT c.name, TYPE_NAME(c.user_type_id), c.is_nullable
            FROM sys.tables t
            JOIN sys.schemas s ON t.schema_id = s.schema_id
            JOIN sys.columns c ON c.object_id = t.object_id
            WHERE s.name = @P1 AND t.name = @P2
            ORDER BY c.column_id"#;
        let rows = self
            .client()?
            .query(sql, &[&schema, &table])
            .await?
            .into_first_result()
            .await?;

        if rows.is_empty() && !self.table_exists(schema, table).await? {
            return Ok(None);
        }

        Ok(Some(
            rows.iter()
                .map(|r| {
                    let name: &str = r.get(0).unwrap_or_default();
                    let data_type: &str = r.get(1).unwrap_or_default();
                    let nullable: bool = r.get(2).unwrap_or(true);
                    ColumnDescriptor::new(name, data_type, nullable)
                })
                .collect(),
        ))
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.client()?.execute(sql, &[]).await?;
        Ok(())
    }

    async fn bulk_load(
        &mut self,
        schema: &str,
        table: &str,
        mapping: &ColumnMapping,
        rows: &[Row],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        // Convert every row before the bulk stream opens: an aborted stream
        // leaves the connection unusable.
        let token_rows = rows
            .iter()
            .map(|row| {
                let mut token_row = TokenRow::new();
                for (value, column) in mapping.project(row).zip(&mapping.columns) {
                    token_row.push(to_column_data(table, column, value)?);
                }
                Ok(token_row)
            })
            .collect::<Result<Vec<_>>>()?;

        let qualified = self.dialect.qualify_table(schema, table);
        let client = self.client()?;

        let mut bulk_load = client
            .bulk_insert(&qualified)
            .await
            .map_err(|e| MigrateError::transfer(table, format!("bulk insert init: {}", e)))?;

        for token_row in token_rows {
            bulk_load
                .send(token_row)
                .await
                .map_err(|e| MigrateError::transfer(table, format!("bulk insert send: {}", e)))?;
        }

        let result = bulk_load
            .finalize()
            .await
            .map_err(|e| MigrateError::transfer(table, format!("bulk insert finalize: {}", e)))?;

        let written = result.total();
        debug!("Bulk inserted {} rows into {}", written, qualified);
        Ok(written)
    }

    async fn reconnect(&mut self) -> Result<()> {
        drop(self.client.take());
        let fresh = Self::connect(&self.connection_string).await?;
        *self = fresh;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!("Error closing SQL Server connection: {}", e);
            }
        }
    }
}
