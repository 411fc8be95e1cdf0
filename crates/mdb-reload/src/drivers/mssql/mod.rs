//! Microsoft SQL Server destination driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlDestination`]: catalog queries and TDS bulk load
//!
//! Connection strings use the ADO.NET format:
//!
//! ```text
//! Server=tcp:host,1433;Database=uma;User Id=sa;Password=...;TrustServerCertificate=true
//! ```

mod dialect;
mod writer;

pub use dialect::MssqlDialect;
pub use writer::MssqlDestination;
