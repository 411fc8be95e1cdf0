//! Run report: per-table outcomes folded into one result.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::reconcile::{ReconciliationOutcome, UnknownTable};

/// Final line printed when any table reported a problem.
pub const WARNING_LINE: &str = "WARNING: Table reload successful, but has bulk insert errors.";

/// Final line printed when every table loaded cleanly.
pub const SUCCESS_LINE: &str = "SUCCESS: Table reload successful!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Loaded,
    Failed,
    TimedOut,
}

/// Outcome of reloading one table into one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub destination: String,
    pub table: String,
    pub status: TableStatus,
    pub rows_loaded: u64,

    /// Present when the first load failed and columns were reconciled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReport {
    pub fn loaded(
        destination: &str,
        table: &str,
        rows: u64,
        reconciliation: Option<ReconciliationOutcome>,
    ) -> Self {
        Self {
            destination: destination.to_string(),
            table: table.to_string(),
            status: TableStatus::Loaded,
            rows_loaded: rows,
            reconciliation,
            error: None,
        }
    }

    pub fn failed(
        destination: &str,
        table: &str,
        error: String,
        reconciliation: Option<ReconciliationOutcome>,
    ) -> Self {
        Self {
            destination: destination.to_string(),
            table: table.to_string(),
            status: TableStatus::Failed,
            rows_loaded: 0,
            reconciliation,
            error: Some(error),
        }
    }

    pub fn timed_out(destination: &str, table: &str, seconds: u64) -> Self {
        Self {
            destination: destination.to_string(),
            table: table.to_string(),
            status: TableStatus::TimedOut,
            rows_loaded: 0,
            reconciliation: None,
            error: Some(
                MigrateError::Timeout {
                    table: table.to_string(),
                    seconds,
                }
                .to_string(),
            ),
        }
    }

    /// A failed load, a timeout, or drift that could not be reconciled.
    pub fn has_warning(&self) -> bool {
        self.status != TableStatus::Loaded
            || self
                .reconciliation
                .as_ref()
                .is_some_and(ReconciliationOutcome::is_unresolved)
    }
}

/// Source tables a destination does not have yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownTablesReport {
    pub destination: String,
    pub source_file: String,
    pub tables: Vec<UnknownTable>,
}

impl UnknownTablesReport {
    /// Scripts an operator can apply, each statement terminated with `;`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "WARNING: {} new table(s) found from the \"{}\" file ({})...",
            self.tables.len(),
            self.source_file,
            self.destination
        );
        let _ = writeln!(out, "{}", "-".repeat(59));
        for table in &self.tables {
            let _ = writeln!(out);
            let _ = writeln!(out, "{};", table.create_script);
            for index in &table.index_scripts {
                let _ = writeln!(out, "{};", index);
            }
        }
        let _ = writeln!(out, "\n{}\n", "-".repeat(59));
        let names: Vec<&str> = self.tables.iter().map(|t| t.name.as_str()).collect();
        let _ = writeln!(out, "{}", names.join(","));
        let _ = writeln!(out, "\n{}", "-".repeat(59));
        out
    }
}

/// A destination that could not be used at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationFailure {
    pub destination: String,
    pub message: String,
}

/// Outcome of the translation load into one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationReport {
    pub destination: String,
    pub rows_loaded: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a reload run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadReport {
    /// Unique run identifier.
    pub run_id: String,

    pub environment: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub duration_seconds: f64,

    pub tables: Vec<TableReport>,

    pub unknown_tables: Vec<UnknownTablesReport>,

    pub destination_failures: Vec<DestinationFailure>,

    /// Set when the translation files could not be listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_error: Option<String>,

    pub translations: Vec<TranslationReport>,
}

impl ReloadReport {
    pub fn new(environment: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            environment: environment.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: 0.0,
            tables: Vec::new(),
            unknown_tables: Vec::new(),
            destination_failures: Vec::new(),
            translation_error: None,
            translations: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        let completed_at = Utc::now();
        self.duration_seconds =
            (completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.completed_at = Some(completed_at);
    }

    /// Whether any problem was recorded during the run.
    pub fn had_errors(&self) -> bool {
        self.tables.iter().any(TableReport::has_warning)
            || !self.destination_failures.is_empty()
            || self.translation_error.is_some()
            || self.translations.iter().any(|t| t.error.is_some())
    }

    pub fn status_line(&self) -> &'static str {
        if self.had_errors() {
            WARNING_LINE
        } else {
            SUCCESS_LINE
        }
    }

    pub fn rows_loaded(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_loaded).sum()
    }

    pub fn failed_tables(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| t.has_warning())
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
