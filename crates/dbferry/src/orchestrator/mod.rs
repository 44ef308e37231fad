//! Migration orchestrator - main workflow coordinator.

use crate::catalog::TableRef;
use crate::config::{Config, EndpointConfig, EngineKind};
use crate::ddl;
use crate::engine::{MssqlConn, PgConn, SourceDb, TargetDb};
use crate::error::{MigrateError, Result};
use crate::progress::{NullProgress, Progress, ProgressEvent};
use crate::transfer;
use crate::typemap::Direction;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One table that did not migrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTable {
    /// Source schema name.
    pub schema: String,

    /// Source table name.
    pub table: String,

    /// Why the table failed.
    pub reason: String,
}

/// Append-only record of failed tables, in visit order.
///
/// An empty manifest signals total success. Entries are unique by
/// construction: each table is visited exactly once per run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FailureManifest {
    entries: Vec<FailedTable>,
}

impl FailureManifest {
    /// Record a failed table.
    pub fn record(
        &mut self,
        schema: impl Into<String>,
        table: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.entries.push(FailedTable {
            schema: schema.into(),
            table: table.into(),
            reason: reason.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Failed tables in the order they were visited.
    pub fn entries(&self) -> &[FailedTable] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a FailureManifest {
    type Item = &'a FailedTable;
    type IntoIter = std::slice::Iter<'a, FailedTable>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Tables visited.
    pub tables_total: usize,

    /// Tables fully migrated.
    pub tables_migrated: usize,

    /// Total rows written to the destination.
    pub rows_transferred: u64,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables that failed, in visit order.
    pub failures: FailureManifest,
}

impl MigrationReport {
    fn empty() -> Self {
        Self {
            tables_total: 0,
            tables_migrated: 0,
            rows_transferred: 0,
            duration_seconds: 0.0,
            failures: FailureManifest::default(),
        }
    }

    /// True when every visited table migrated.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Convert to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator.
///
/// Validates connectivity, picks the pipeline for the configured
/// source/destination pair, and drives discovery -> DDL -> transfer over
/// every table, isolating per-table failures in the manifest.
pub struct Orchestrator {
    config: Config,
    progress: Arc<dyn Progress>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            progress: Arc::new(NullProgress),
        }
    }

    /// Install a progress observer.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the migration.
    pub async fn run(&self) -> Result<MigrationReport> {
        let started = Instant::now();
        let source_cfg = &self.config.source;
        let dest_cfg = &self.config.destination;
        let bulk_timeout = Duration::from_secs(self.config.transfer.bulk_timeout_secs);

        self.progress.on_event(&ProgressEvent::RunStarted {
            source: source_cfg.endpoint(),
            destination: dest_cfg.endpoint(),
        });

        // Connecting validates both endpoints before any DDL is issued; a
        // failure here aborts the whole run.
        let mut report = match (source_cfg.kind, dest_cfg.kind) {
            (EngineKind::Mssql, EngineKind::Mssql) => {
                info!("Pipeline: mssql -> mssql (same dialect)");
                let mut source = MssqlConn::connect(source_cfg, bulk_timeout).await?;
                let mut dest = MssqlConn::connect(dest_cfg, bulk_timeout).await?;
                self.drive(&mut source, &mut dest, None).await?
            }
            (EngineKind::Mssql, EngineKind::Postgres) => {
                info!("Pipeline: mssql -> postgres");
                let mut source = MssqlConn::connect(source_cfg, bulk_timeout).await?;
                let mut dest = PgConn::connect(dest_cfg).await?;
                self.drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
                    .await?
            }
            (EngineKind::Postgres, EngineKind::Mssql) => {
                info!("Pipeline: postgres -> mssql");
                let mut source = PgConn::connect(source_cfg).await?;
                let mut dest = MssqlConn::connect(dest_cfg, bulk_timeout).await?;
                self.drive(&mut source, &mut dest, Some(Direction::PostgresToMssql))
                    .await?
            }
            (source, dest) => {
                warn!(
                    "Unsupported migration pair {} -> {}; nothing to do",
                    source, dest
                );
                MigrationReport::empty()
            }
        };

        report.duration_seconds = started.elapsed().as_secs_f64();

        self.progress.on_event(&ProgressEvent::RunFinished {
            tables_migrated: report.tables_migrated,
            tables_failed: report.failures.len(),
        });

        info!(
            "Migration finished: {}/{} tables, {} rows in {:.1}s",
            report.tables_migrated,
            report.tables_total,
            report.rows_transferred,
            report.duration_seconds
        );

        Ok(report)
    }

    /// Walk schemas and tables, isolating failures per table.
    async fn drive<S, D>(
        &self,
        source: &mut S,
        dest: &mut D,
        direction: Option<Direction>,
    ) -> Result<MigrationReport>
    where
        S: SourceDb,
        D: TargetDb,
    {
        let selection = &self.config.selection;
        let mut report = MigrationReport::empty();

        let schemas = source
            .list_schemas()
            .await
            .map_err(|e| MigrateError::Discovery(format!("listing schemas: {}", e)))?;

        for schema in schemas {
            if !selection.allows_schema(&schema) {
                debug!("Skipping schema {} (not selected)", schema);
                continue;
            }

            self.progress.on_event(&ProgressEvent::SchemaStarted {
                schema: schema.clone(),
            });

            dest.create_schema(&schema)
                .await
                .map_err(|e| MigrateError::ddl(&schema, format!("creating schema: {}", e)))?;
            info!("Created destination schema {}", schema);

            let tables = source.list_tables(&schema).await.map_err(|e| {
                MigrateError::Discovery(format!("listing tables in {}: {}", schema, e))
            })?;

            for table in tables {
                if !selection.allows_table(&table.schema, &table.name) {
                    debug!("Skipping table {} (not selected)", table.full_name());
                    continue;
                }

                report.tables_total += 1;
                self.progress.on_event(&ProgressEvent::TableStarted {
                    schema: table.schema.clone(),
                    table: table.name.clone(),
                });

                match self.migrate_table(source, dest, direction, &table).await {
                    Ok(rows) => {
                        info!("{}: migrated {} rows", table.full_name(), rows);
                        report.tables_migrated += 1;
                        report.rows_transferred += rows;
                        self.progress.on_event(&ProgressEvent::TableMigrated {
                            schema: table.schema.clone(),
                            table: table.name.clone(),
                            rows,
                        });
                    }
                    Err(e) => {
                        warn!("{}: {}", table.full_name(), e);
                        self.progress.on_event(&ProgressEvent::TableFailed {
                            schema: table.schema.clone(),
                            table: table.name.clone(),
                            reason: e.to_string(),
                        });
                        report.failures.record(&table.schema, &table.name, e.to_string());
                    }
                }
            }
        }

        Ok(report)
    }

    /// Create and fill one destination table. Any error is isolated to this
    /// table by the caller.
    async fn migrate_table<S, D>(
        &self,
        source: &mut S,
        dest: &mut D,
        direction: Option<Direction>,
        table: &TableRef,
    ) -> Result<u64>
    where
        S: SourceDb,
        D: TargetDb,
    {
        let columns = source.list_columns(&table.schema, &table.name).await?;
        if columns.is_empty() {
            return Err(MigrateError::Discovery(format!(
                "{} has no columns in the catalog",
                table.full_name()
            )));
        }

        let create_sql = ddl::create_table_stmt(
            dest.kind(),
            &table.schema,
            &table.name,
            &columns,
            direction,
        );
        dest.execute_ddl(&create_sql)
            .await
            .map_err(|e| MigrateError::ddl(table.full_name(), e.to_string()))?;
        debug!("Created destination table {}", table.full_name());

        transfer::transfer_table(source, dest, table, &columns).await
    }
}

/// Verify both configured endpoints are reachable.
pub async fn health_check(config: &Config) -> Result<()> {
    check_endpoint(&config.source).await?;
    check_endpoint(&config.destination).await?;
    Ok(())
}

async fn check_endpoint(config: &EndpointConfig) -> Result<()> {
    match config.kind {
        EngineKind::Mssql => {
            MssqlConn::connect(config, Duration::from_secs(30)).await?;
        }
        EngineKind::Postgres => {
            PgConn::connect(config).await?;
        }
    }
    info!("{} is reachable", config.endpoint());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::value::{SqlNullType, SqlValue};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory source with fixed catalog contents.
    struct FakeSource {
        schemas: Vec<String>,
        tables: HashMap<String, Vec<String>>,
        columns: Vec<Column>,
        rows: HashMap<String, Vec<Vec<SqlValue>>>,
    }

    #[async_trait]
    impl SourceDb for FakeSource {
        fn kind(&self) -> EngineKind {
            EngineKind::Mssql
        }

        async fn list_schemas(&mut self) -> Result<Vec<String>> {
            Ok(self.schemas.clone())
        }

        async fn list_tables(&mut self, schema: &str) -> Result<Vec<TableRef>> {
            Ok(self
                .tables
                .get(schema)
                .map(|names| {
                    names
                        .iter()
                        .map(|n| TableRef::new(schema, n.clone()))
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn list_columns(&mut self, _schema: &str, _table: &str) -> Result<Vec<Column>> {
            Ok(self.columns.clone())
        }

        async fn fetch_rows(
            &mut self,
            schema: &str,
            table: &str,
            _columns: &[Column],
        ) -> Result<Vec<Vec<SqlValue>>> {
            Ok(self
                .rows
                .get(&format!("{}.{}", schema, table))
                .cloned()
                .unwrap_or_default())
        }
    }

    /// In-memory destination that records everything and can fail one table.
    #[derive(Default)]
    struct FakeTarget {
        schemas_created: Vec<String>,
        ddl: Vec<String>,
        loads: Vec<(String, Vec<String>, usize)>,
        fail_bulk_for: Option<String>,
    }

    #[async_trait]
    impl TargetDb for FakeTarget {
        fn kind(&self) -> EngineKind {
            EngineKind::Postgres
        }

        async fn create_schema(&mut self, schema: &str) -> Result<()> {
            self.schemas_created.push(schema.to_string());
            Ok(())
        }

        async fn execute_ddl(&mut self, sql: &str) -> Result<()> {
            self.ddl.push(sql.to_string());
            Ok(())
        }

        async fn bulk_load(
            &mut self,
            schema: &str,
            table: &str,
            columns: &[String],
            rows: Vec<Vec<SqlValue>>,
        ) -> Result<u64> {
            let name = format!("{}.{}", schema, table);
            if self.fail_bulk_for.as_deref() == Some(name.as_str()) {
                return Err(MigrateError::transfer(&name, "simulated write failure"));
            }
            self.loads.push((name, columns.to_vec(), rows.len()));
            Ok(rows.len() as u64)
        }
    }

    fn test_config() -> Config {
        Config::from_yaml(
            r#"
source:
  kind: mssql
  host: src
  database: db
  user: u
  password: p
destination:
  kind: postgres
  host: dst
  database: db
  user: u
  password: p
"#,
        )
        .unwrap()
    }

    fn three_table_source() -> FakeSource {
        let columns = vec![
            Column::new("id", "int"),
            Column::new("note", "text"),
            Column::new("created", "datetime2"),
        ];
        let row = vec![
            SqlValue::I32(1),
            SqlValue::Null(SqlNullType::String),
            SqlValue::Null(SqlNullType::DateTime),
        ];
        let mut rows = HashMap::new();
        rows.insert("sales.t1".to_string(), vec![row.clone(); 2]);
        rows.insert("sales.t2".to_string(), vec![row.clone(); 3]);
        rows.insert("sales.t3".to_string(), vec![row; 4]);

        FakeSource {
            schemas: vec!["sales".to_string()],
            tables: HashMap::from([(
                "sales".to_string(),
                vec!["t1".to_string(), "t2".to_string(), "t3".to_string()],
            )]),
            columns,
            rows,
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_one_table() {
        let orchestrator = Orchestrator::new(test_config());
        let mut source = three_table_source();
        let mut dest = FakeTarget {
            fail_bulk_for: Some("sales.t2".to_string()),
            ..FakeTarget::default()
        };

        let report = orchestrator
            .drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
            .await
            .unwrap();

        // Exactly t2 in the manifest, t1 and t3 landed with their rows.
        assert_eq!(report.tables_total, 3);
        assert_eq!(report.tables_migrated, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures.entries()[0].schema, "sales");
        assert_eq!(report.failures.entries()[0].table, "t2");

        let loaded: Vec<_> = dest.loads.iter().map(|(n, _, rows)| (n.as_str(), *rows)).collect();
        assert_eq!(loaded, vec![("sales.t1", 2), ("sales.t3", 4)]);
        assert_eq!(report.rows_transferred, 6);
    }

    #[tokio::test]
    async fn test_clean_run_has_empty_manifest() {
        let orchestrator = Orchestrator::new(test_config());
        let mut source = three_table_source();
        let mut dest = FakeTarget::default();

        let report = orchestrator
            .drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.tables_migrated, 3);
        assert_eq!(dest.schemas_created, vec!["sales"]);
        assert_eq!(dest.ddl.len(), 3);
    }

    #[tokio::test]
    async fn test_column_order_flows_from_discovery_to_ddl_and_binding() {
        let orchestrator = Orchestrator::new(test_config());
        let mut source = three_table_source();
        let mut dest = FakeTarget::default();

        orchestrator
            .drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
            .await
            .unwrap();

        // DDL lists columns in discovery order with mapped types.
        assert_eq!(
            dest.ddl[0],
            "CREATE TABLE \"sales\".\"t1\" (\"id\" integer, \"note\" text, \"created\" timestamp)"
        );
        // Bulk binding uses the identical order.
        assert_eq!(dest.loads[0].1, vec!["id", "note", "created"]);
    }

    #[tokio::test]
    async fn test_zero_table_schema_is_not_an_error() {
        let orchestrator = Orchestrator::new(test_config());
        let mut source = FakeSource {
            schemas: vec!["empty".to_string()],
            tables: HashMap::new(),
            columns: vec![],
            rows: HashMap::new(),
        };
        let mut dest = FakeTarget::default();

        let report = orchestrator
            .drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
            .await
            .unwrap();

        assert_eq!(report.tables_total, 0);
        assert!(report.is_success());
        // The destination schema is still created.
        assert_eq!(dest.schemas_created, vec!["empty"]);
    }

    #[tokio::test]
    async fn test_zero_column_table_fails_in_isolation() {
        let orchestrator = Orchestrator::new(test_config());
        let mut source = three_table_source();
        source.columns = vec![];
        let mut dest = FakeTarget::default();

        let report = orchestrator
            .drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
            .await
            .unwrap();

        assert_eq!(report.tables_total, 3);
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.entries()[0].reason.contains("no columns"));
    }

    #[tokio::test]
    async fn test_selection_restricts_visited_tables() {
        let mut config = test_config();
        config.selection.enabled = true;
        config.selection.entries = vec![crate::config::SelectionEntry {
            schema: "sales".to_string(),
            tables: vec!["t2".to_string()],
        }];

        let orchestrator = Orchestrator::new(config);
        let mut source = three_table_source();
        let mut dest = FakeTarget::default();

        let report = orchestrator
            .drive(&mut source, &mut dest, Some(Direction::MssqlToPostgres))
            .await
            .unwrap();

        assert_eq!(report.tables_total, 1);
        assert_eq!(dest.loads.len(), 1);
        assert_eq!(dest.loads[0].0, "sales.t2");
    }

    #[tokio::test]
    async fn test_unsupported_pair_is_a_no_op() {
        let mut config = test_config();
        config.source.kind = EngineKind::Postgres;
        // postgres -> postgres has no pipeline; run() must not touch either
        // endpoint (the fake hosts would fail to resolve).
        let report = Orchestrator::new(config).run().await.unwrap();
        assert_eq!(report.tables_total, 0);
        assert!(report.is_success());
    }

    #[test]
    fn test_manifest_keeps_visit_order() {
        let mut manifest = FailureManifest::default();
        manifest.record("s", "b", "x");
        manifest.record("s", "a", "y");
        let names: Vec<_> = manifest.into_iter().map(|f| f.table.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut report = MigrationReport::empty();
        report.tables_total = 1;
        report.failures.record("sales", "orders", "boom");
        let json = report.to_json().unwrap();
        assert!(json.contains("\"orders\""));
        assert!(json.contains("\"boom\""));
    }
}
