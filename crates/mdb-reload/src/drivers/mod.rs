//! Database driver implementations.
//!
//! - [`sqlite`]: read-only source reader for the game database files
//! - [`mysql`]: MySQL/MariaDB destination
//! - [`mssql`]: Microsoft SQL Server destination
//!
//! Each destination driver provides a `Dialect` and a `Destination`. The
//! engine is chosen once from [`DestinationKind`] by [`connect`].

pub mod mssql;
pub mod mysql;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod memory;

pub use mssql::{MssqlDestination, MssqlDialect};
pub use mysql::{MysqlDestination, MysqlDialect};
pub use sqlite::SqliteSource;

use crate::config::{DestinationConfig, DestinationKind};
use crate::core::traits::Destination;
use crate::error::Result;

/// Open a connection to a configured destination.
pub async fn connect(config: &DestinationConfig) -> Result<Box<dyn Destination>> {
    match config.r#type {
        DestinationKind::Mysql => Ok(Box::new(
            MysqlDestination::connect(&config.connection_string).await?,
        )),
        DestinationKind::Mssql => Ok(Box::new(
            MssqlDestination::connect(&config.connection_string).await?,
        )),
    }
}
