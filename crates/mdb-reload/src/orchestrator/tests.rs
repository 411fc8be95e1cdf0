use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use tempfile::TempDir;
use tokio::sync::watch;

use super::*;
use crate::config::DestinationKind;
use crate::core::value::SqlValue;
use crate::drivers::memory::MemoryDestination;
use crate::fetch::tests::serve;
use crate::reconcile::ReconciliationOutcome;

async fn create_db(path: &Path, statements: &[&str]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&opts).await.unwrap();
    for sql in statements {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
}

/// Game install layout: `master/master.mdb` and `meta`.
async fn create_sources(dir: &Path) {
    create_db(
        &dir.join("master").join("master.mdb"),
        &[
            "CREATE TABLE Users (id INTEGER NOT NULL, name TEXT)",
            "INSERT INTO Users VALUES (1, 'Special Week'), (2, 'Silence Suzuka')",
            "CREATE TABLE items (id INTEGER, label TEXT)",
            "INSERT INTO items VALUES (10, 'carrot')",
            "CREATE TABLE new_table (id INTEGER)",
            "CREATE INDEX new_table_0 ON new_table(id)",
        ],
    )
    .await;
    create_db(
        &dir.join("meta"),
        &[
            "CREATE TABLE a (n TEXT)",
            "INSERT INTO a VALUES ('bundle')",
        ],
    )
    .await;
}

fn config(dir: &Path) -> Config {
    let mut config = Config::new("Production", "owner/repo", "main")
        .with_destination(DestinationKind::Mysql, "mysql://root:pw@localhost/uma");
    config.source.local_dir = Some(dir.to_path_buf());
    config.source.work_dir = dir.join("work");
    config.translation.enabled = false;
    config
}

fn destination() -> MemoryDestination {
    MemoryDestination::new()
        .with_table("Users", &[("id", "bigint")])
        .with_table("items", &[("id", "bigint"), ("label", "text")])
        .with_table("meta_a", &[("n", "text")])
        .with_table(
            "text_data_english",
            &[("OriginalText", "text"), ("TranslatedText", "text")],
        )
}

fn no_cancel() -> watch::Receiver<bool> {
    let (_, rx) = watch::channel(false);
    rx
}

async fn reload(
    orchestrator: &Orchestrator,
    dest: &mut MemoryDestination,
) -> Result<ReloadReport> {
    let sources = orchestrator.load_sources().await?;
    let dest_config = orchestrator.config().destinations[0].clone();
    let mut targets = vec![Target::new(&dest_config, dest)];
    let mut report = ReloadReport::new("Production");
    orchestrator
        .reload_into(&sources, &mut targets, &mut report, &no_cancel())
        .await?;
    report.finish();
    Ok(report)
}

#[tokio::test]
async fn test_reload_adds_missing_column_and_succeeds() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let mut dest = destination();

    let report = reload(&orchestrator, &mut dest).await.unwrap();

    assert_eq!(dest.alters(), vec!["ALTER TABLE `Users` ADD `name` TEXT NULL"]);
    assert_eq!(
        dest.rows("Users"),
        &[
            vec![SqlValue::Integer(1), SqlValue::from("Special Week")],
            vec![SqlValue::Integer(2), SqlValue::from("Silence Suzuka")],
        ]
    );
    assert_eq!(dest.rows("meta_a"), &[vec![SqlValue::from("bundle")]]);

    let users = report.tables.iter().find(|t| t.table == "Users").unwrap();
    assert_eq!(
        users.reconciliation,
        Some(ReconciliationOutcome::ColumnsAdded(vec!["name".into()]))
    );
    // identical column sets never reach reconciliation
    let items = report.tables.iter().find(|t| t.table == "items").unwrap();
    assert_eq!(items.reconciliation, None);
    assert_eq!(items.rows_loaded, 1);

    assert_eq!(report.status_line(), SUCCESS_LINE);
}

#[tokio::test]
async fn test_unknown_table_is_reported_not_loaded() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let mut dest = destination();

    let report = reload(&orchestrator, &mut dest).await.unwrap();

    assert_eq!(report.unknown_tables.len(), 1);
    let unknown = &report.unknown_tables[0];
    assert_eq!(unknown.source_file, "master/master.mdb");
    assert_eq!(unknown.tables[0].name, "new_table");
    assert_eq!(
        unknown.tables[0].index_scripts,
        vec!["CREATE INDEX new_table_0 ON new_table(id)"]
    );
    assert!(!dest.load_attempts.iter().any(|t| t == "new_table"));
    assert!(!report.tables.iter().any(|t| t.table == "new_table"));
}

#[tokio::test]
async fn test_reload_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let mut dest = destination();

    reload(&orchestrator, &mut dest).await.unwrap();
    let first = dest.tables.clone();
    let report = reload(&orchestrator, &mut dest).await.unwrap();

    for (name, table) in &first {
        assert_eq!(dest.rows(name), table.rows.as_slice(), "table {}", name);
    }
    // second run finds every column in place
    assert!(report.tables.iter().all(|t| t.reconciliation.is_none()));
}

#[tokio::test]
async fn test_failed_table_is_a_warning_and_others_continue() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let mut dest = destination();
    dest.failing_tables.insert("items".into());

    let report = reload(&orchestrator, &mut dest).await.unwrap();

    let items = report.tables.iter().find(|t| t.table == "items").unwrap();
    assert_eq!(items.status, TableStatus::Failed);
    assert_eq!(items.reconciliation, Some(ReconciliationOutcome::UpToDate));
    // first attempt plus one retry
    assert_eq!(dest.load_attempts.iter().filter(|t| *t == "items").count(), 2);
    assert_eq!(dest.rows("meta_a").len(), 1);
    assert_eq!(report.status_line(), WARNING_LINE);
}

#[tokio::test]
async fn test_local_infile_refusal_is_fatal() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let mut dest = destination();
    dest.refuse_bulk_load = true;

    let err = reload(&orchestrator, &mut dest).await.unwrap_err();
    assert!(matches!(err, MigrateError::LocalInfileDisabled(_)));
    assert_eq!(dest.load_attempts.len(), 1);
}

#[tokio::test]
async fn test_unhandled_type_halts_run() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    create_db(
        &dir.path().join("master").join("master.mdb"),
        &["ALTER TABLE items ADD payload BLOB"],
    )
    .await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let mut dest = destination();

    let err = reload(&orchestrator, &mut dest).await.unwrap_err();
    assert!(matches!(err, MigrateError::UnhandledType { ref column, .. } if column == "payload"));
    assert!(!dest.alters().iter().any(|a| a.contains("payload")));
    assert!(dest.column_names("items").iter().all(|c| c != "payload"));
    // the run stops before the meta database
    assert!(dest.rows("meta_a").is_empty());
}

#[tokio::test]
async fn test_unreachable_destination_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let sources = orchestrator.load_sources().await.unwrap();

    let mysql = DestinationConfig::new(DestinationKind::Mysql, "mysql://x@localhost/uma");
    let mut mssql = DestinationConfig::new(DestinationKind::Mssql, "Server=tcp:localhost,1433");
    mssql.data_schema = Some("RawData".into());

    let mut down = destination();
    down.unreachable = true;
    let mut up = destination();

    let mut targets = vec![Target::new(&mysql, &mut down), Target::new(&mssql, &mut up)];
    let mut report = ReloadReport::new("Production");
    orchestrator
        .reload_into(&sources, &mut targets, &mut report, &no_cancel())
        .await
        .unwrap();
    drop(targets);

    assert_eq!(report.destination_failures.len(), 2);
    assert!(report.destination_failures.iter().all(|f| f.destination == "MySQL"));
    assert_eq!(up.rows("Users").len(), 2);
    assert!(up.executed.contains(&"TRUNCATE TABLE `RawData`.`Users`".to_string()));
    assert!(report.had_errors());
}

#[tokio::test]
async fn test_cancel_stops_before_next_table() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();
    let sources = orchestrator.load_sources().await.unwrap();
    let dest_config = orchestrator.config().destinations[0].clone();
    let mut dest = destination();

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let mut targets = vec![Target::new(&dest_config, &mut dest)];
    let mut report = ReloadReport::new("Production");
    let err = orchestrator
        .reload_into(&sources, &mut targets, &mut report, &rx)
        .await
        .unwrap_err();
    drop(targets);
    assert!(matches!(err, MigrateError::Cancelled));
    assert!(dest.load_attempts.is_empty());
}

/// Reload with the clock paused so a stalled load times out immediately.
async fn reload_with_stall(dest: &mut MemoryDestination) -> ReloadReport {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let mut config = config(dir.path());
    config.reload.table_timeout_secs = 5;
    let orchestrator = Orchestrator::new(config).unwrap();
    let sources = orchestrator.load_sources().await.unwrap();
    let dest_config = orchestrator.config().destinations[0].clone();

    tokio::time::pause();
    let mut targets = vec![Target::new(&dest_config, dest)];
    let mut report = ReloadReport::new("Production");
    orchestrator
        .reload_into(&sources, &mut targets, &mut report, &no_cancel())
        .await
        .unwrap();
    report
}

#[tokio::test]
async fn test_timed_out_table_reconnects_and_continues() {
    let mut dest = destination();
    dest.stalled_tables.insert("items".into());

    let report = reload_with_stall(&mut dest).await;

    let items = report.tables.iter().find(|t| t.table == "items").unwrap();
    assert_eq!(items.status, TableStatus::TimedOut);
    assert_eq!(
        items.error.as_deref(),
        Some("Reload of table items timed out after 5s")
    );
    assert_eq!(dest.reconnects, 1);

    // the meta database still loads over the fresh connection
    assert_eq!(dest.rows("meta_a"), &[vec![SqlValue::from("bundle")]]);
    assert!(report.destination_failures.is_empty());
    assert_eq!(report.status_line(), WARNING_LINE);
}

#[tokio::test]
async fn test_failed_reconnect_abandons_destination() {
    let mut dest = destination();
    dest.stalled_tables.insert("items".into());
    dest.refuse_reconnect = true;

    let report = reload_with_stall(&mut dest).await;

    assert_eq!(dest.reconnects, 1);
    assert_eq!(report.destination_failures.len(), 1);
    assert_eq!(report.destination_failures[0].destination, "MySQL");
    assert!(!dest.load_attempts.contains(&"meta_a".to_string()));
    assert!(report.tables.iter().all(|t| t.table != "meta_a"));
    assert!(report.had_errors());
}

#[tokio::test]
async fn test_missing_source_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    create_db(&dir.path().join("master").join("master.mdb"), &[]).await;
    let orchestrator = Orchestrator::new(config(dir.path())).unwrap();

    let err = orchestrator.acquire_sources().await.unwrap_err();
    assert!(matches!(err, MigrateError::SourceFileMissing(ref p) if p.ends_with("meta")));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_download_failure_is_fatal_missing_file() {
    let dir = TempDir::new().unwrap();
    let base = serve(vec![]).await;
    let mut config = config(dir.path());
    config.source.local_dir = None;
    config.reload.raw_base_url = base.clone();
    config.reload.api_base_url = base;
    let orchestrator = Orchestrator::new(config).unwrap();

    let err = orchestrator.acquire_sources().await.unwrap_err();
    assert!(matches!(err, MigrateError::SourceFileMissing(_)));
}

#[tokio::test]
async fn test_translations_load_after_tables() {
    let dir = TempDir::new().unwrap();
    create_sources(dir.path()).await;
    let base = serve(vec![
        (
            "/repos/o/t/git/trees/master?recursive=1".into(),
            r#"{"sha":"s","tree":[{"path":"translations/localify/ui.json","type":"blob"}]}"#
                .into(),
        ),
        (
            "/o/t/master/translations/localify/ui.json".into(),
            r#"{"いいえ": "No", "はい": "Yes"}"#.into(),
        ),
    ])
    .await;

    let mut config = config(dir.path());
    config.translation.enabled = true;
    config.translation.repository = "o/t".into();
    config.reload.raw_base_url = base.clone();
    config.reload.api_base_url = base;
    let orchestrator = Orchestrator::new(config).unwrap();
    let mut dest = destination();
    dest.tables
        .get_mut("text_data_english")
        .unwrap()
        .rows
        .push(vec![SqlValue::from("old"), SqlValue::from("stale")]);

    let report = reload(&orchestrator, &mut dest).await.unwrap();

    assert_eq!(report.translations.len(), 1);
    assert_eq!(report.translations[0].rows_loaded, 2);
    let rows = dest.rows("text_data_english");
    assert_eq!(rows.len(), 2);
    // sorted by original text
    assert_eq!(rows[0][0], SqlValue::from("いいえ"));
    assert_eq!(rows[1][1], SqlValue::from("Yes"));
    assert_eq!(report.status_line(), SUCCESS_LINE);
}

#[test]
fn test_file_name() {
    assert_eq!(file_name("master/master.mdb"), "master.mdb");
    assert_eq!(file_name("meta"), "meta");
}
