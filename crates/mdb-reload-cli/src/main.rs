//! mdb-reload CLI - reload the game database into MySQL and SQL Server.

use clap::Parser;
use mdb_reload::{Config, DestinationKind, MigrateError, Orchestrator, ReloadReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mdb-reload")]
#[command(about = "Reload the game's SQLite data files into MySQL/MariaDB and SQL Server")]
#[command(version)]
struct Cli {
    /// Release environment, e.g. Production or Development
    environment: Option<String>,

    /// GitHub repository holding the data files (owner/name)
    repository: Option<String>,

    /// Branch of the repository
    branch: Option<String>,

    /// MySQL/MariaDB connection URL, or N/A to skip
    mysql_connection: Option<String>,

    /// SQL Server ADO connection string, or N/A to skip
    sqlserver_connection: Option<String>,

    /// Pass "verbose" to log every step
    #[arg(value_name = "VERBOSE")]
    verbose_word: Option<String>,

    /// YAML configuration file; positional arguments override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read master/master.mdb and meta from this directory instead of GitHub
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Directory for downloaded files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Skip the translation load
    #[arg(long)]
    no_translations: bool,

    /// Log every step
    #[arg(short, long)]
    verbose: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Cli {
    fn is_verbose(&self) -> bool {
        self.verbose
            || self
                .verbose_word
                .as_deref()
                .is_some_and(|w| w.eq_ignore_ascii_case("verbose"))
    }

    /// Build the run configuration: the YAML file if given, with positional
    /// arguments and flags layered on top.
    fn build_config(&self) -> Result<Config, MigrateError> {
        let mut config = match &self.config {
            Some(path) => {
                let config = Config::load(path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            None => {
                let missing = [
                    ("ENVIRONMENT", &self.environment),
                    ("REPOSITORY", &self.repository),
                    ("BRANCH", &self.branch),
                    ("MYSQL_CONNECTION", &self.mysql_connection),
                ]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(name, _)| name)
                .collect::<Vec<_>>();
                if !missing.is_empty() {
                    return Err(MigrateError::Config(format!(
                        "missing required arguments: {} (or pass --config)",
                        missing.join(", ")
                    )));
                }
                Config::new("", "", "")
            }
        };

        if let Some(environment) = &self.environment {
            config.environment = environment.clone();
        }
        if let Some(repository) = &self.repository {
            config.source.repository = repository.clone();
        }
        if let Some(branch) = &self.branch {
            config.source.branch = branch.clone();
        }
        for (kind, connection) in [
            (DestinationKind::Mysql, &self.mysql_connection),
            (DestinationKind::Mssql, &self.sqlserver_connection),
        ] {
            if let Some(connection) = connection {
                config.destinations.retain(|d| d.r#type != kind);
                config = config.with_destination(kind, connection);
            }
        }
        if let Some(dir) = &self.local_dir {
            config.source.local_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.work_dir {
            config.source.work_dir = dir.clone();
        }
        if self.no_translations {
            config.translation.enabled = false;
        }
        config.verbose |= self.is_verbose();

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(cli.is_verbose(), &cli.log_format);

    let config = cli.build_config()?;
    let orchestrator = Orchestrator::new(config)?;

    let cancel = setup_signal_handler();
    let report = orchestrator.run(Some(cancel)).await?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ReloadReport) {
    for unknown in &report.unknown_tables {
        println!("{}", unknown.render());
    }

    println!("\nReload completed!");
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Tables: {}", report.tables.len());
    println!("  Rows: {}", report.rows_loaded());
    for table in report.failed_tables() {
        println!(
            "  Failed: {} ({}): {}",
            table.table,
            table.destination,
            table.error.as_deref().unwrap_or("columns could not be reconciled")
        );
    }
    for failure in &report.destination_failures {
        println!("  Unreachable: {}: {}", failure.destination, failure.message);
    }
    if let Some(error) = &report.translation_error {
        println!("  Translations: {}", error);
    }
    for translation in &report.translations {
        match &translation.error {
            Some(error) => println!("  Translations ({}): {}", translation.destination, error),
            None => println!(
                "  Translations ({}): {} rows",
                translation.destination, translation.rows_loaded
            ),
        }
    }

    println!("\n{}", report.status_line());
}

fn setup_logging(verbose: bool, format: &str) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Flip the returned receiver to `true` on SIGINT or SIGTERM. The run stops
/// before its next table.
#[cfg(unix)]
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            eprintln!("Cannot install signal handlers; Ctrl-C will not stop the run cleanly");
            return;
        };
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping after the current table..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping after the current table..."),
        }
        let _ = tx.send(true);
    });

    rx
}

#[cfg(not(unix))]
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current table...");
            let _ = tx.send(true);
        }
    });

    rx
}
