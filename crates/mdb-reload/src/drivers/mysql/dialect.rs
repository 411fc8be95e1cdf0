//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific identifier quoting and column type mapping.

use crate::core::schema::PrimitiveType;
use crate::core::traits::Dialect;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain backticks by doubling them
        format!("`{}`", name.replace('`', "``"))
    }

    fn map_type(&self, ty: &PrimitiveType) -> Option<&'static str> {
        match ty {
            PrimitiveType::Integer => Some("BIGINT"),
            // Unbounded; the database must use the utf8mb4 character set
            PrimitiveType::Text => Some("TEXT"),
            PrimitiveType::Other(_) => None,
        }
    }
}
