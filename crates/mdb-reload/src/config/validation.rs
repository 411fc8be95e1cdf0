//! Configuration validation.

use super::{Config, DestinationKind};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.environment.trim().is_empty() {
        return Err(MigrateError::Config("environment is required".into()));
    }

    // Source validation
    if config.source.local_dir.is_none() {
        let repo = config.source.repository.trim();
        if repo.is_empty() {
            return Err(MigrateError::Config("source.repository is required".into()));
        }
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(MigrateError::Config(format!(
                "source.repository must look like 'owner/name', got '{}'",
                repo
            )));
        }
        if config.source.branch.trim().is_empty() {
            return Err(MigrateError::Config("source.branch is required".into()));
        }
    }
    if config.source.master_path.is_empty() || config.source.meta_path.is_empty() {
        return Err(MigrateError::Config(
            "source.master_path and source.meta_path cannot be empty".into(),
        ));
    }

    // Destination validation
    let enabled: Vec<_> = config
        .destinations
        .iter()
        .filter(|d| d.is_enabled())
        .collect();
    if enabled.is_empty() {
        return Err(MigrateError::Config(
            "at least one destination connection string is required".into(),
        ));
    }
    for dest in &enabled {
        if dest.r#type == DestinationKind::Mysql
            && !dest.connection_string.trim_start().starts_with("mysql://")
        {
            return Err(MigrateError::Config(
                "MySQL connection string must be a mysql:// URL".into(),
            ));
        }
    }
    for kind in [DestinationKind::Mysql, DestinationKind::Mssql] {
        if enabled.iter().filter(|d| d.r#type == kind).count() > 1 {
            return Err(MigrateError::Config(format!(
                "only one {} destination may be configured",
                kind
            )));
        }
    }

    // Reload config validation
    if config.reload.table_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "reload.table_timeout_secs must be at least 1".into(),
        ));
    }
    if config.translation.enabled {
        if config.translation.max_concurrent_downloads == 0 {
            return Err(MigrateError::Config(
                "translation.max_concurrent_downloads must be at least 1".into(),
            ));
        }
        if config.translation.table.trim().is_empty() {
            return Err(MigrateError::Config("translation.table is required".into()));
        }
    }

    Ok(())
}
