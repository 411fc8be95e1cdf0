//! MSSQL SQL dialect (Strategy pattern).
//!
//! Provides MSSQL-specific identifier quoting and column type mapping.

use crate::core::schema::PrimitiveType;
use crate::core::traits::Dialect;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain closing brackets by doubling them
        format!("[{}]", name.replace(']', "]]"))
    }

    fn map_type(&self, ty: &PrimitiveType) -> Option<&'static str> {
        match ty {
            PrimitiveType::Integer => Some("BIGINT"),
            // NVARCHAR(MAX) columns cannot be indexed; 4000 is the widest
            // length that still can.
            PrimitiveType::Text => Some("NVARCHAR(4000)"),
            PrimitiveType::Other(_) => None,
        }
    }
}
