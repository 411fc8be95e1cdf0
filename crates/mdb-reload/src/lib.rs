//! # mdb-reload
//!
//! Reload the game's SQLite data files into MySQL/MariaDB and SQL Server.
//!
//! A run fetches `master/master.mdb` and `meta` from a GitHub repository (or
//! reads a local game install), then for every configured destination:
//!
//! - **Truncate and bulk load** every table the destination already has,
//!   using `LOAD DATA LOCAL INFILE` on MySQL and TDS bulk insert on SQL Server
//! - **Reconcile columns** once when a load fails, adding source columns the
//!   destination lacks, then load again
//! - **Report new tables** with their creation and index scripts instead of
//!   creating them
//! - **Load translations** merged from the community translation repository
//!
//! ## Example
//!
//! ```rust,no_run
//! use mdb_reload::{Config, DestinationKind, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mdb_reload::Result<()> {
//!     let config = Config::new("Production", "owner/umamusume-db", "main")
//!         .with_destination(DestinationKind::Mysql, "mysql://root:pw@localhost/uma");
//!     let report = Orchestrator::new(config)?.run(None).await?;
//!     println!("{}", report.status_line());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod reconcile;
pub mod transfer;
pub mod translation;

// Re-exports for convenient access
pub use config::{
    Config, DestinationConfig, DestinationKind, ReloadConfig, SourceConfig, TranslationConfig,
};
pub use crate::core::{ColumnDescriptor, Destination, Dialect, SqlValue, TableSnapshot};
pub use error::{MigrateError, Result};
pub use orchestrator::{Orchestrator, ReloadReport, TableReport, TableStatus};
pub use reconcile::ReconciliationOutcome;
