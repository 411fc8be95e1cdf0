//! Reload orchestrator - main workflow coordinator.
//!
//! 1. Acquire `master/master.mdb` and `meta` (download or local install)
//! 2. Read both source catalogs into memory
//! 3. Per source database, per destination: surface unknown tables, then
//!    reload every known table with one reconcile-and-retry on failure
//! 4. Load merged translation text into every destination
//!
//! Destinations are independent: one that cannot be reached or listed is
//! recorded and the others proceed. Only fatal errors end the run early.

mod report;

pub use report::{
    DestinationFailure, ReloadReport, TableReport, TableStatus, TranslationReport,
    UnknownTablesReport, SUCCESS_LINE, WARNING_LINE,
};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DestinationConfig};
use crate::core::schema::{SourceCatalog, TableSnapshot};
use crate::core::traits::Destination;
use crate::drivers::{self, SqliteSource};
use crate::error::{MigrateError, Result};
use crate::fetch::GithubClient;
use crate::reconcile::{partition_tables, reconcile_columns};
use crate::transfer::{load_table, Attempt, LoadTarget};
use crate::translation::download_translations;

/// One source database read into memory.
#[derive(Debug)]
pub struct SourceDatabase {
    /// Repository path of the file, e.g. `master/master.mdb`.
    pub label: String,

    /// Prefix of this database's tables in the destination.
    pub table_prefix: String,

    pub catalog: SourceCatalog,
}

/// A connected destination and its configuration.
pub(crate) struct Target<'a> {
    pub config: &'a DestinationConfig,
    pub dest: &'a mut dyn Destination,

    /// Set once the connection is lost for good; the rest of the run skips it.
    pub failed: bool,
}

impl<'a> Target<'a> {
    pub fn new(config: &'a DestinationConfig, dest: &'a mut dyn Destination) -> Self {
        Self {
            config,
            dest,
            failed: false,
        }
    }

    /// Replace a connection abandoned mid-statement. When that fails the
    /// destination is recorded as unreachable and marked failed.
    async fn recover(&mut self, seconds: u64, report: &mut ReloadReport) -> Result<()> {
        let destination = self.config.r#type.to_string();
        info!("Reconnecting to {} destination", destination);

        let reconnect = self.dest.reconnect();
        let message = match tokio::time::timeout(Duration::from_secs(seconds), reconnect).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) if e.is_fatal() => return Err(e),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("reconnect timed out after {}s", seconds),
        };

        error!(
            "Cannot reconnect to {} destination, skipping it: {}",
            destination, message
        );
        report.destination_failures.push(DestinationFailure {
            destination,
            message,
        });
        self.failed = true;
        Ok(())
    }
}

/// Reload orchestrator.
pub struct Orchestrator {
    config: Config,
    github: GithubClient,
}

impl Orchestrator {
    /// Create a new orchestrator from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let github = GithubClient::new(&config.reload.raw_base_url, &config.reload.api_base_url)?;
        Ok(Self { config, github })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the reload.
    pub async fn run(self, cancel: Option<watch::Receiver<bool>>) -> Result<ReloadReport> {
        let cancel = cancel.unwrap_or_else(|| {
            let (_, rx) = watch::channel(false);
            rx
        });

        let mut report = ReloadReport::new(&self.config.environment);
        info!(
            "Starting reload run {} in \"{}\"",
            report.run_id, self.config.environment
        );

        // Phase 1: Acquire and read sources
        let sources = self.load_sources().await?;

        // Phase 2: Connect destinations
        let mut connected: Vec<(&DestinationConfig, Box<dyn Destination>)> = Vec::new();
        for dest_config in self.config.destinations.iter().filter(|d| d.is_enabled()) {
            match drivers::connect(dest_config).await {
                Ok(dest) => connected.push((dest_config, dest)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Cannot connect to {} destination: {}", dest_config.r#type, e);
                    report.destination_failures.push(DestinationFailure {
                        destination: dest_config.r#type.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Phase 3 and 4: Reload tables and translations
        let result = {
            let mut targets: Vec<Target<'_>> = connected
                .iter_mut()
                .map(|(config, dest)| Target::new(*config, dest.as_mut()))
                .collect();
            self.reload_into(&sources, &mut targets, &mut report, &cancel)
                .await
        };

        for (_, dest) in connected.iter_mut() {
            dest.close().await;
        }
        result?;

        report.finish();
        info!(
            "Reload finished: {} tables, {} rows in {:.1}s",
            report.tables.len(),
            report.rows_loaded(),
            report.duration_seconds
        );
        Ok(report)
    }

    /// Directory holding the game's own copy of the data files, if this run
    /// reads from disk instead of downloading.
    pub fn local_source_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.config.source.local_dir {
            return Some(dir.clone());
        }
        if self.config.is_development() && cfg!(windows) {
            return std::env::var_os("USERPROFILE").map(|home| {
                PathBuf::from(home)
                    .join("AppData")
                    .join("LocalLow")
                    .join("Cygames")
                    .join("umamusume")
            });
        }
        None
    }

    /// Locate or download both source files. A file missing afterwards is
    /// fatal.
    pub async fn acquire_sources(&self) -> Result<(PathBuf, PathBuf)> {
        let source = &self.config.source;

        let (master, meta) = match self.local_source_dir() {
            Some(dir) => {
                info!("Reading source files from {}", dir.display());
                (dir.join(&source.master_path), dir.join(&source.meta_path))
            }
            None => {
                let master = source.work_dir.join(file_name(&source.master_path));
                let meta = source.work_dir.join(file_name(&source.meta_path));
                for (path, local) in [(&source.master_path, &master), (&source.meta_path, &meta)] {
                    if let Err(e) = self
                        .github
                        .download(&source.repository, &source.branch, path, local)
                        .await
                    {
                        error!("Download of \"{}\" failed: {}", path, e);
                    }
                }
                (master, meta)
            }
        };

        for path in [&master, &meta] {
            if !path.is_file() {
                return Err(MigrateError::SourceFileMissing(path.clone()));
            }
        }
        info!("Found meta and master.mdb files");
        Ok((master, meta))
    }

    /// Acquire and read both source databases, master first.
    pub async fn load_sources(&self) -> Result<Vec<SourceDatabase>> {
        let (master_path, meta_path) = self.acquire_sources().await?;
        let source = &self.config.source;

        let mut sources = Vec::with_capacity(2);
        for (label, path, prefix) in [
            (&source.master_path, master_path, ""),
            (&source.meta_path, meta_path, source.meta_table_prefix.as_str()),
        ] {
            let mut reader = SqliteSource::open(&path).await?;
            let catalog = reader.read_catalog().await?;
            reader.close().await?;
            sources.push(SourceDatabase {
                label: label.clone(),
                table_prefix: prefix.to_string(),
                catalog,
            });
        }
        Ok(sources)
    }

    /// Reload every source database into every target, then translations.
    pub(crate) async fn reload_into(
        &self,
        sources: &[SourceDatabase],
        targets: &mut [Target<'_>],
        report: &mut ReloadReport,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        for source in sources {
            for target in targets.iter_mut() {
                self.reload_database(source, target, report, cancel).await?;
            }
        }

        if self.config.translation.enabled && !targets.is_empty() {
            self.load_translations(targets, report, cancel).await?;
        }
        Ok(())
    }

    async fn reload_database(
        &self,
        source: &SourceDatabase,
        target: &mut Target<'_>,
        report: &mut ReloadReport,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        if target.failed {
            return Ok(());
        }
        let destination = target.config.r#type.to_string();
        let schema = target.config.data_schema();
        info!(
            "Attempting to load \"{}\" table data into a {} database",
            source.label, destination
        );

        let existing = match target.dest.list_tables(schema).await {
            Ok(tables) => tables,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("Cannot list tables of {} destination: {}", destination, e);
                report.destination_failures.push(DestinationFailure {
                    destination,
                    message: e.to_string(),
                });
                return Ok(());
            }
        };

        let partition = partition_tables(&source.catalog, &existing, &source.table_prefix);
        if !partition.unknown.is_empty() {
            warn!(
                "{} new table(s) found from the \"{}\" file",
                partition.unknown.len(),
                source.label
            );
            report.unknown_tables.push(UnknownTablesReport {
                destination: destination.clone(),
                source_file: source.label.clone(),
                tables: partition.unknown,
            });
        }

        let seconds = self.config.reload.table_timeout_secs;
        for (table, snapshot) in partition.load {
            if *cancel.borrow() {
                return Err(MigrateError::Cancelled);
            }

            let reload = reload_table(&mut *target.dest, &destination, schema, &table, snapshot);
            let outcome = tokio::time::timeout(Duration::from_secs(seconds), reload).await;
            match outcome {
                Ok(result) => report.tables.push(result?),
                Err(_) => {
                    error!("Reload of {} timed out after {}s", table, seconds);
                    report
                        .tables
                        .push(TableReport::timed_out(&destination, &table, seconds));
                    target.recover(seconds, report).await?;
                    if target.failed {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    async fn load_translations(
        &self,
        targets: &mut [Target<'_>],
        report: &mut ReloadReport,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        let config = &self.config.translation;
        let dictionary =
            match download_translations(&self.github, config, &self.config.source.work_dir).await {
                Ok(dictionary) => dictionary,
                Err(e) => {
                    error!("Cannot retrieve translation files: {}", e);
                    report.translation_error = Some(e.to_string());
                    return Ok(());
                }
            };
        let snapshot = dictionary.to_snapshot(&config.table);
        let seconds = self.config.reload.table_timeout_secs;

        for target in targets.iter_mut().filter(|t| !t.failed) {
            if *cancel.borrow() {
                return Err(MigrateError::Cancelled);
            }
            let destination = target.config.r#type.to_string();
            let load_target = LoadTarget::positional(target.config.translation_schema(), &config.table);
            let load = load_table(&mut *target.dest, load_target, &snapshot, Attempt::Retry);

            let (rows_loaded, error) =
                match tokio::time::timeout(Duration::from_secs(seconds), load).await {
                    Ok(Ok(rows)) => {
                        info!("Loaded {} translations into {}", rows, destination);
                        (rows, None)
                    }
                    Ok(Err(e)) if e.is_fatal() => return Err(e),
                    Ok(Err(e)) => (0, Some(e.to_string())),
                    Err(_) => {
                        let error = MigrateError::Timeout {
                            table: config.table.clone(),
                            seconds,
                        };
                        (0, Some(error.to_string()))
                    }
                };
            report.translations.push(TranslationReport {
                destination,
                rows_loaded,
                error,
            });
        }
        Ok(())
    }
}

/// Reload one table: load, and on failure reconcile columns and load once
/// more. Only fatal errors are returned as `Err`.
pub(crate) async fn reload_table(
    dest: &mut dyn Destination,
    destination: &str,
    schema: &str,
    table: &str,
    snapshot: &TableSnapshot,
) -> Result<TableReport> {
    let target = LoadTarget::by_name(schema, table);

    match load_table(dest, target, snapshot, Attempt::First).await {
        Ok(rows) => {
            debug!("{}: {} rows", table, rows);
            return Ok(TableReport::loaded(destination, table, rows, None));
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(_) => {}
    }

    let outcome = reconcile_columns(dest, schema, table, snapshot).await?;

    match load_table(dest, target, snapshot, Attempt::Retry).await {
        Ok(rows) => Ok(TableReport::loaded(destination, table, rows, Some(outcome))),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(TableReport::failed(destination, table, e.to_string(), Some(outcome))),
    }
}

fn file_name(repo_path: &str) -> &str {
    Path::new(repo_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(repo_path)
}

#[cfg(test)]
mod tests;
