//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Connection string value that disables a destination.
pub const DISABLED_CONNECTION: &str = "N/A";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Release environment name, e.g. `Production` or `Development`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Where the source databases come from.
    pub source: SourceConfig,

    /// Destinations to reload, processed in order.
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    /// Translation text load.
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Reload behavior.
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Log every step instead of progress only.
    #[serde(default)]
    pub verbose: bool,
}

impl Config {
    /// Configuration with defaults for everything but the source location.
    pub fn new(
        environment: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            source: SourceConfig::new(repository, branch),
            destinations: Vec::new(),
            translation: TranslationConfig::default(),
            reload: ReloadConfig::default(),
            verbose: false,
        }
    }

    /// Add a destination unless its connection string is empty or `N/A`.
    pub fn with_destination(mut self, kind: DestinationKind, connection_string: &str) -> Self {
        let destination = DestinationConfig::new(kind, connection_string);
        if destination.is_enabled() {
            self.destinations.push(destination);
        }
        self
    }

    /// Whether this run targets the development build of the game.
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

/// Source database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// GitHub repository holding the data files, as `owner/name`.
    pub repository: String,

    /// Branch of `repository` to download from.
    pub branch: String,

    /// Read the data files from this directory instead of downloading them.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,

    /// Directory downloaded files are written to.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Repository path of the master database.
    #[serde(default = "default_master_path")]
    pub master_path: String,

    /// Repository path of the meta database.
    #[serde(default = "default_meta_path")]
    pub meta_path: String,

    /// Prefix applied to meta table names in the destination.
    #[serde(default = "default_meta_prefix")]
    pub meta_table_prefix: String,
}

impl SourceConfig {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            local_dir: None,
            work_dir: default_work_dir(),
            master_path: default_master_path(),
            meta_path: default_meta_path(),
            meta_table_prefix: default_meta_prefix(),
        }
    }
}

/// Supported destination engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlserver")]
    Mssql,
}

impl DestinationKind {
    /// Schema holding the game tables when none is configured.
    pub fn default_data_schema(&self) -> &'static str {
        match self {
            DestinationKind::Mysql => "",
            DestinationKind::Mssql => "RawData",
        }
    }

    /// Schema holding the translation table when none is configured.
    pub fn default_translation_schema(&self) -> &'static str {
        match self {
            DestinationKind::Mysql => "",
            DestinationKind::Mssql => "dbo",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Mysql => f.write_str("MySQL"),
            DestinationKind::Mssql => f.write_str("SQL Server"),
        }
    }
}

impl FromStr for DestinationKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DestinationKind::Mysql),
            "mssql" | "sqlserver" | "sql-server" => Ok(DestinationKind::Mssql),
            other => Err(MigrateError::Config(format!(
                "unknown destination type '{}' (expected mysql or mssql)",
                other
            ))),
        }
    }
}

/// One destination database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Engine type.
    pub r#type: DestinationKind,

    /// `mysql://` URL for MySQL, ADO string for SQL Server.
    pub connection_string: String,

    /// Schema of the game tables (default depends on `type`).
    #[serde(default)]
    pub data_schema: Option<String>,

    /// Schema of the translation table (default depends on `type`).
    #[serde(default)]
    pub translation_schema: Option<String>,
}

impl DestinationConfig {
    pub fn new(kind: DestinationKind, connection_string: impl Into<String>) -> Self {
        Self {
            r#type: kind,
            connection_string: connection_string.into(),
            data_schema: None,
            translation_schema: None,
        }
    }

    /// A destination is skipped when its connection string is empty or `N/A`.
    pub fn is_enabled(&self) -> bool {
        let conn = self.connection_string.trim();
        !conn.is_empty() && !conn.eq_ignore_ascii_case(DISABLED_CONNECTION)
    }

    pub fn data_schema(&self) -> &str {
        self.data_schema
            .as_deref()
            .unwrap_or_else(|| self.r#type.default_data_schema())
    }

    pub fn translation_schema(&self) -> &str {
        self.translation_schema
            .as_deref()
            .unwrap_or_else(|| self.r#type.default_translation_schema())
    }
}

/// Community translation source and its destination table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Load translations after the game tables.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// GitHub repository, as `owner/name`.
    #[serde(default = "default_translation_repository")]
    pub repository: String,

    #[serde(default = "default_translation_branch")]
    pub branch: String,

    /// Only JSON files whose path contains this segment are loaded.
    #[serde(default = "default_translation_prefix")]
    pub path_prefix: String,

    /// Two-column destination table receiving the merged dictionary.
    #[serde(default = "default_translation_table")]
    pub table: String,

    /// Maximum downloads in flight.
    #[serde(default = "default_max_downloads")]
    pub max_concurrent_downloads: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository: default_translation_repository(),
            branch: default_translation_branch(),
            path_prefix: default_translation_prefix(),
            table: default_translation_table(),
            max_concurrent_downloads: default_max_downloads(),
        }
    }
}

/// Reload behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Upper bound for reloading a single table, in seconds.
    #[serde(default = "default_table_timeout")]
    pub table_timeout_secs: u64,

    /// Base URL for raw file downloads.
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    /// Base URL of the GitHub REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            table_timeout_secs: default_table_timeout(),
            raw_base_url: default_raw_base_url(),
            api_base_url: default_api_base_url(),
        }
    }
}

// Default value functions for serde
fn default_environment() -> String {
    "Production".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_master_path() -> String {
    "master/master.mdb".to_string()
}

fn default_meta_path() -> String {
    "meta".to_string()
}

fn default_meta_prefix() -> String {
    "meta_".to_string()
}

fn default_translation_repository() -> String {
    "noccu/umamusu-translate".to_string()
}

fn default_translation_branch() -> String {
    "master".to_string()
}

fn default_translation_prefix() -> String {
    "translations/".to_string()
}

fn default_translation_table() -> String {
    "text_data_english".to_string()
}

fn default_max_downloads() -> usize {
    200
}

fn default_table_timeout() -> u64 {
    600
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_true() -> bool {
    true
}
