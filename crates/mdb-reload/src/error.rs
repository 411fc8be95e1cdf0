//! Error types for the reload library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for reload operations.
///
/// Most variants are recoverable at table granularity: the orchestrator turns
/// them into a warning and moves on to the next table. The variants for which
/// [`MigrateError::is_fatal`] returns `true` abort the whole run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing arguments, invalid YAML, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source file was not present after acquisition
    #[error("Cannot find source database file {}", .0.display())]
    SourceFileMissing(PathBuf),

    /// Source catalog could not be read
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// MySQL/MariaDB destination error
    #[error("MySQL destination error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// SQL Server destination error
    #[error("SQL Server destination error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// HTTP error while fetching remote files
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A missing source column has a type with no destination mapping
    #[error("Unable to handle SQLite datatype '{data_type}' for column {table}.{column}")]
    UnhandledType {
        table: String,
        column: String,
        data_type: String,
    },

    /// MySQL refuses LOAD DATA LOCAL INFILE
    #[error(
        "MySQL destination refuses LOAD DATA LOCAL INFILE ({0}). \
         Enable local_infile on the server; it is required for bulk loading."
    )]
    LocalInfileDisabled(String),

    /// Snapshot columns that do not exist in the destination table
    #[error(
        "The given column mapping does not match up with any column in the destination \
         table {table}: {}",
        .columns.join(", ")
    )]
    ColumnMapping { table: String, columns: Vec<String> },

    /// Destination table does not exist
    #[error("Table {0} does not exist in the destination")]
    TableNotFound(String),

    /// Bulk load failed for a specific table
    #[error("Bulk load failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A table reload exceeded its time budget
    #[error("Reload of table {table} timed out after {seconds}s")]
    Timeout { table: String, seconds: u64 },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Reload cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error must terminate the run instead of being recorded
    /// as a table-level warning.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::SourceFileMissing(_)
                | MigrateError::UnhandledType { .. }
                | MigrateError::LocalInfileDisabled(_)
                | MigrateError::Source(_)
                | MigrateError::Config(_)
                | MigrateError::Cancelled
        )
    }

    /// Whether this is the column mapping mismatch raised before any row is sent.
    pub fn is_column_mapping(&self) -> bool {
        matches!(self, MigrateError::ColumnMapping { .. })
    }

    /// Process exit code for an error that ended the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            MigrateError::SourceFileMissing(_) | MigrateError::Source(_) => 3,
            MigrateError::UnhandledType { .. } => 4,
            MigrateError::LocalInfileDisabled(_) => 5,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reload operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
