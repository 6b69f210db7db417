//! Migration orchestrator - main workflow coordinator.
//!
//! A run moves through fixed phases:
//!
//! 1. Load the checkpoint and compute the [`RunPlan`]
//! 2. Clear truncation targets from the checkpoint, then truncate the work
//!    list and the always-truncate tables
//! 3. Provision views and load every table, continuing past failures
//! 4. Persist the checkpoint
//! 5. Execute the destination initialization scripts

mod plan;
mod pools;

pub use plan::{RunMode, RunPlan};
pub use pools::{ConnectionRegistry, SourceHandle};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::SqlCatalog;
use crate::config::Config;
use crate::core::identifier::validate_plan_table;
use crate::core::traits::TargetWriter;
use crate::error::{PortError, Result, EXIT_DATA_ERROR, EXIT_SCRIPT_ERROR};
use crate::pipeline::{JobResult, TableJob};
use crate::state::CheckpointStore;
use crate::transfer::TableLoader;
use crate::view::ViewProvisioner;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    catalog: SqlCatalog,
    registry: ConnectionRegistry,
    checkpoint: Arc<CheckpointStore>,
    provisioner: Arc<ViewProvisioner>,
    loader: TableLoader,
}

/// Terminal state of a run that reached the script phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every table loaded and every script ran.
    CompletedFully,
    /// Every script ran but at least one table failed.
    CompletedPartially,
    /// An initialization script failed; later scripts were not run.
    FailedAtInitialization,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::CompletedFully => 0,
            RunOutcome::CompletedPartially => EXIT_DATA_ERROR,
            RunOutcome::FailedAtInitialization => EXIT_SCRIPT_ERROR,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::CompletedFully => write!(f, "completed"),
            RunOutcome::CompletedPartially => write!(f, "completed with failures"),
            RunOutcome::FailedAtInitialization => write!(f, "failed at initialization"),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    pub mode: RunMode,

    pub outcome: RunOutcome,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Per-table results in plan order.
    pub tables: Vec<JobResult>,

    /// Tables in the work list.
    pub tables_total: usize,

    /// Tables successfully migrated.
    pub tables_success: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Tables skipped because a previous run already loaded them.
    pub tables_skipped: Vec<String>,

    /// Destination tables truncated before loading.
    pub truncated: Vec<String>,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Initialization scripts that ran, in order.
    pub scripts_executed: Vec<String>,

    /// Script that stopped the initialization phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_script: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_error: Option<String>,

    /// Checkpoint file written by this run.
    pub checkpoint_file: PathBuf,

    pub checkpoint_persisted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_error: Option<String>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity of one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    pub name: String,

    /// "source" or "destination".
    pub role: &'static str,

    pub db_type: String,

    pub healthy: bool,

    pub latency_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    /// Whether every endpoint answered.
    pub healthy: bool,

    pub endpoints: Vec<EndpointHealth>,
}

impl HealthCheckResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A table job that is either finished or still running.
enum PendingJob {
    Done(JobResult),
    Running(String, JoinHandle<JobResult>),
}

impl Orchestrator {
    /// Create a new orchestrator.
    ///
    /// Validates the configuration, indexes the SQL catalog and connects to
    /// every source and the destination.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let catalog = SqlCatalog::from_config(&config)?;
        info!(
            "SQL catalog: {} table queries, {} scripts",
            catalog.table_count(),
            catalog.script_count()
        );
        let registry = ConnectionRegistry::connect(&config).await?;
        Ok(Self::from_parts(config, catalog, registry))
    }

    /// Create an orchestrator over an existing catalog and connections.
    pub fn from_parts(config: Config, catalog: SqlCatalog, registry: ConnectionRegistry) -> Self {
        let checkpoint = CheckpointStore::new(config.migration.checkpoint_path());
        let loader = TableLoader::new(config.migration.batch_size);
        Self {
            config,
            catalog,
            registry,
            checkpoint: Arc::new(checkpoint),
            provisioner: Arc::new(ViewProvisioner::new()),
            loader,
        }
    }

    /// Run the migration.
    ///
    /// `refresh` forces a full reload. Otherwise tables recorded in the
    /// checkpoint are skipped. Table failures are reported in the result;
    /// a truncate failure or a missing initialization script is returned as
    /// an error.
    pub async fn run(&self, refresh: bool) -> Result<MigrationResult> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!("Starting migration run {}", run_id);

        // Phase 1: plan
        let loaded = self.checkpoint.load();
        let plan = RunPlan::compute(&self.config.plan, loaded.as_ref(), refresh);
        let stale: Vec<String> = loaded
            .iter()
            .flatten()
            .filter(|t| plan.truncation_targets.contains(t))
            .cloned()
            .collect();
        match (plan.mode, loaded) {
            (RunMode::Resume, Some(done)) => self.checkpoint.seed(done),
            _ => self.checkpoint.seed(Default::default()),
        }
        info!(
            "Phase 1: {} run, {} tables to load, {} skipped",
            plan.mode,
            plan.work_list.len(),
            plan.skipped.len()
        );

        for table in &plan.truncation_targets {
            validate_plan_table(table, &self.config.plan)?;
        }
        let scripts = self.resolve_scripts()?;

        // Phase 2: truncate
        // A table stops counting as loaded the moment it is truncated, so the
        // durable checkpoint must not list it while the run is in flight.
        if !stale.is_empty() {
            info!(
                "Phase 2: clearing {} tables from checkpoint before truncation",
                stale.len()
            );
            for table in &plan.truncation_targets {
                self.checkpoint.forget(table);
            }
            self.checkpoint.persist(&run_id)?;
        }

        let target = self.registry.target();
        if plan.truncation_targets.is_empty() {
            info!("Phase 2: nothing to truncate");
        } else {
            info!(
                "Phase 2: truncating {} destination tables",
                plan.truncation_targets.len()
            );
            target.truncate_tables(&plan.truncation_targets).await?;
        }

        // Phase 3: load
        info!(
            "Phase 3: loading {} tables with {} workers",
            plan.work_list.len(),
            self.config.migration.workers
        );
        let tables = self.load_tables(&plan.work_list).await?;

        // Phase 4: checkpoint
        info!("Phase 4: writing checkpoint");
        let checkpoint_error = match self.checkpoint.persist(&run_id) {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to persist checkpoint: {}", e);
                Some(e.to_string())
            }
        };

        // Phase 5: initialization scripts
        info!("Phase 5: running {} initialization scripts", scripts.len());
        let mut scripts_executed = Vec::new();
        let mut failed_script = None;
        for (name, sql) in &scripts {
            info!("Executing initialization script {}", name);
            match target.execute_script(sql).await {
                Ok(()) => scripts_executed.push(name.clone()),
                Err(e) => {
                    let e = PortError::script(name.as_str(), e.to_string());
                    error!("{}", e);
                    failed_script = Some((name.clone(), e.to_string()));
                    break;
                }
            }
        }

        let failed_tables: Vec<String> = tables
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.table.clone())
            .collect();
        let rows_transferred: u64 = tables.iter().map(|r| r.rows).sum();
        let duration = start_time.elapsed();

        let outcome = if failed_script.is_some() {
            RunOutcome::FailedAtInitialization
        } else if failed_tables.is_empty() {
            RunOutcome::CompletedFully
        } else {
            RunOutcome::CompletedPartially
        };
        let (failed_script, script_error) = match failed_script {
            Some((name, message)) => (Some(name), Some(message)),
            None => (None, None),
        };

        let result = MigrationResult {
            run_id,
            mode: plan.mode,
            outcome,
            duration_seconds: duration.as_secs_f64(),
            started_at,
            completed_at: Utc::now(),
            tables_total: tables.len(),
            tables_success: tables.len() - failed_tables.len(),
            tables_failed: failed_tables.len(),
            tables,
            tables_skipped: plan.skipped,
            truncated: plan.truncation_targets,
            rows_transferred,
            rows_per_second: rows_per_second(rows_transferred, duration),
            failed_tables,
            scripts_executed,
            failed_script,
            script_error,
            checkpoint_file: self.checkpoint.path().to_path_buf(),
            checkpoint_persisted: checkpoint_error.is_none(),
            checkpoint_error,
        };

        info!(
            "Migration {}: {}/{} tables, {} rows in {:.1}s",
            result.outcome,
            result.tables_success,
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds
        );
        if !result.failed_tables.is_empty() {
            warn!("Failed tables: {}", result.failed_tables.join(", "));
        }

        Ok(result)
    }

    /// Read every initialization script before anything runs.
    fn resolve_scripts(&self) -> Result<Vec<(String, String)>> {
        self.config
            .plan
            .init_scripts
            .iter()
            .map(|name| Ok((name.clone(), self.catalog.read_script_sql(name)?)))
            .collect()
    }

    /// Load the work list, returning one result per table in plan order.
    async fn load_tables(&self, work_list: &[String]) -> Result<Vec<JobResult>> {
        let workers = self.config.migration.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let destination = self.config.destination.name.clone();
        let mut pending = Vec::with_capacity(work_list.len());

        for table in work_list {
            let (job, source) = match self.prepare_job(table) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!("{}: cannot resolve table job: {}", table, e);
                    pending.push(PendingJob::Done(JobResult::failed(table, None, e)));
                    continue;
                }
            };

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PortError::pool(e, "acquiring table worker"))?;

            let target = Arc::clone(self.registry.target());
            let checkpoint = Arc::clone(&self.checkpoint);
            let provisioner = Arc::clone(&self.provisioner);
            let loader = self.loader.clone();
            let destination = destination.clone();

            let handle = tokio::spawn(async move {
                let result =
                    execute_job(&job, &source, target, &provisioner, &loader, &destination).await;
                if result.is_success() {
                    checkpoint.record_success(&job.table);
                }
                drop(permit);
                result
            });
            pending.push(PendingJob::Running(table.clone(), handle));
        }

        let mut results = Vec::with_capacity(pending.len());
        for job in pending {
            let result = match job {
                PendingJob::Done(result) => result,
                PendingJob::Running(table, handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("{}: table task failed: {}", table, e);
                        JobResult::failed(&table, None, format!("task failed: {}", e))
                    }
                },
            };
            results.push(result);
        }
        Ok(results)
    }

    fn prepare_job(&self, table: &str) -> Result<(TableJob, SourceHandle)> {
        let job = TableJob::resolve(table, &self.catalog)?;
        let source = self.registry.source(&job.source)?.clone();
        if source.use_view {
            validate_plan_table(job.view_name(), &self.config.plan)?;
        }
        Ok((job.with_view(source.use_view), source))
    }

    /// Check connectivity to every source and the destination.
    pub async fn health_check(&self) -> HealthCheckResult {
        let mut endpoints = Vec::new();

        for source in self.registry.sources() {
            let start = Instant::now();
            let outcome = source.reader.test_connection().await;
            endpoints.push(endpoint_health(
                &source.name,
                "source",
                source.reader.db_type(),
                start.elapsed(),
                outcome,
            ));
        }

        let target = self.registry.target();
        let start = Instant::now();
        let outcome = target.test_connection().await;
        endpoints.push(endpoint_health(
            &self.config.destination.name,
            "destination",
            target.db_type(),
            start.elapsed(),
            outcome,
        ));

        HealthCheckResult {
            healthy: endpoints.iter().all(|e| e.healthy),
            endpoints,
        }
    }

    /// Close every connection pool.
    pub async fn close(&self) {
        self.registry.close().await;
    }
}

/// Provision the view if needed, then load one table.
async fn execute_job(
    job: &TableJob,
    source: &SourceHandle,
    target: Arc<dyn TargetWriter>,
    provisioner: &ViewProvisioner,
    loader: &TableLoader,
    destination: &str,
) -> JobResult {
    let reader = source.reader.as_ref();

    let outcome = async {
        if job.use_view {
            provisioner
                .provision(&source.name, reader, job.view_name(), &job.query)
                .await?;
        }
        let query = job.extraction_query(reader.dialect())?;
        debug!("{}: extracting with {}", job.table, query);
        loader.load(reader, &query, target.as_ref(), &job.table).await
    }
    .await;

    match outcome {
        Ok(stats) => JobResult::succeeded(job, &stats),
        Err(e) => {
            error!(
                "{}: load from source '{}' into destination '{}' failed: {}",
                job.table, source.name, destination, e
            );
            JobResult::failed(&job.table, Some(source.name.as_str()), e)
        }
    }
}

fn endpoint_health(
    name: &str,
    role: &'static str,
    db_type: &str,
    latency: Duration,
    outcome: Result<()>,
) -> EndpointHealth {
    if let Err(e) = &outcome {
        warn!("Health check failed for {} '{}': {}", role, name, e);
    }
    EndpointHealth {
        name: name.to_string(),
        role,
        db_type: db_type.to_string(),
        healthy: outcome.is_ok(),
        latency_ms: latency.as_millis() as u64,
        error: outcome.err().map(|e| e.to_string()),
    }
}

fn rows_per_second(rows: u64, duration: Duration) -> u64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        (rows as f64 / secs) as u64
    } else {
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationConfig, MigrationConfig, PlanConfig};
    use crate::core::value::{Row, SqlValue};
    use crate::state::Checkpoint;
    use crate::testing::{MemorySource, MemoryTarget};
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![SqlValue::I64(i as i64)]).collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Source `erp` serving tables A, B and C (3, 4 and 5 rows), and scripts
    /// `s1`..`s3` for destination `warehouse`.
    fn source() -> MemorySource {
        MemorySource::mysql("erp")
            .with_result("SELECT id FROM src_a", &["id"], rows(3))
            .with_result("SELECT id FROM src_b", &["id"], rows(4))
            .with_result("SELECT id FROM src_c", &["id"], rows(5))
    }

    fn mssql_source() -> MemorySource {
        MemorySource::mssql("erp")
            .with_result("SELECT id FROM src_a", &["id"], rows(3))
            .with_result("SELECT id FROM src_b", &["id"], rows(4))
            .with_result("SELECT id FROM src_c", &["id"], rows(5))
    }

    struct Fixture {
        dir: TempDir,
        source: Arc<MemorySource>,
        target: Arc<MemoryTarget>,
        orchestrator: Orchestrator,
    }

    impl Fixture {
        fn checkpoint(&self) -> PathBuf {
            self.dir.path().join("state/checkpoint.json")
        }

        fn persisted(&self) -> BTreeSet<String> {
            Checkpoint::read(&self.checkpoint()).unwrap().table_set()
        }
    }

    fn write_catalog(root: &Path) {
        fs::create_dir_all(root.join("sql/erp")).unwrap();
        fs::create_dir_all(root.join("sql/warehouse")).unwrap();
        fs::write(root.join("sql/erp/A.sql"), "SELECT id FROM src_a;\n").unwrap();
        fs::write(root.join("sql/erp/B.sql"), "SELECT id FROM src_b;\n").unwrap();
        fs::write(root.join("sql/erp/C.sql"), "SELECT id FROM src_c;\n").unwrap();
        for s in ["s1", "s2", "s3"] {
            fs::write(
                root.join(format!("sql/warehouse/{}.sql", s)),
                format!("CALL refresh_{}();", s),
            )
            .unwrap();
        }
    }

    fn config(root: &Path, workers: usize) -> Config {
        Config {
            destination: DestinationConfig {
                name: "warehouse".to_string(),
                r#type: "mysql".to_string(),
                host: "localhost".to_string(),
                port: 3306,
                database: "dw".to_string(),
                user: "loader".to_string(),
                password: String::new(),
                ssl_mode: "disable".to_string(),
            },
            sources: vec![],
            plan: PlanConfig {
                tables: strings(&["A", "B", "C"]),
                always_truncate: strings(&["L"]),
                init_scripts: strings(&["s1", "s2", "s3"]),
            },
            sql_root: root.join("sql"),
            migration: MigrationConfig {
                workers,
                checkpoint_file: Some(root.join("state/checkpoint.json")),
                ..MigrationConfig::default()
            },
        }
    }

    fn fixture_with(
        dir: TempDir,
        source: MemorySource,
        target: MemoryTarget,
        use_view: bool,
        workers: usize,
    ) -> Fixture {
        let config = config(dir.path(), workers);
        let catalog = SqlCatalog::scan(&config.sql_root, &["erp"], "warehouse").unwrap();
        let source = Arc::new(source);
        let target = Arc::new(target);
        let registry = ConnectionRegistry::from_parts(
            vec![SourceHandle::new("erp", use_view, source.clone())],
            target.clone(),
        );
        Fixture {
            dir,
            source,
            target,
            orchestrator: Orchestrator::from_parts(config, catalog, registry),
        }
    }

    fn fixture(source: MemorySource, target: MemoryTarget) -> Fixture {
        let dir = TempDir::new().unwrap();
        write_catalog(dir.path());
        fixture_with(dir, source, target, false, 1)
    }

    #[tokio::test]
    async fn test_full_refresh() {
        let fx = fixture(source(), MemoryTarget::new());

        let result = fx.orchestrator.run(true).await.unwrap();

        assert_eq!(result.mode, RunMode::Fresh);
        assert_eq!(result.outcome, RunOutcome::CompletedFully);
        assert_eq!(fx.target.truncations(), vec![strings(&["A", "B", "C", "L"])]);
        assert_eq!(fx.target.loaded_tables(), strings(&["A", "B", "C"]));
        assert_eq!(result.rows_transferred, 12);
        assert_eq!(
            fx.target.scripts(),
            strings(&["CALL refresh_s1();", "CALL refresh_s2();", "CALL refresh_s3();"])
        );
        assert_eq!(result.scripts_executed, strings(&["s1", "s2", "s3"]));
        assert!(result.checkpoint_persisted);
        assert_eq!(fx.persisted(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let fx = fixture(source(), MemoryTarget::new().failing_table("B"));

        let result = fx.orchestrator.run(true).await.unwrap();

        assert_eq!(result.outcome, RunOutcome::CompletedPartially);
        assert_eq!(result.failed_tables, strings(&["B"]));
        assert_eq!(result.tables_success, 2);
        assert_eq!(fx.target.rows("A").len(), 3);
        assert_eq!(fx.target.rows("C").len(), 5);
        assert_eq!(fx.persisted(), set(&["A", "C"]));
        assert_eq!(result.scripts_executed.len(), 3);

        let b = &result.tables[1];
        assert_eq!(b.table, "B");
        assert_eq!(b.source.as_deref(), Some("erp"));
        assert!(b.error.as_deref().unwrap().contains("Duplicate entry"));
    }

    #[tokio::test]
    async fn test_resume_skips_checkpointed_tables() {
        let fx = fixture(source(), MemoryTarget::new());
        Checkpoint::new("previous", &set(&["A"]))
            .write(&fx.checkpoint())
            .unwrap();

        let result = fx.orchestrator.run(false).await.unwrap();

        assert_eq!(result.mode, RunMode::Resume);
        assert_eq!(result.tables_skipped, strings(&["A"]));
        assert_eq!(fx.target.truncations(), vec![strings(&["B", "C", "L"])]);
        assert_eq!(fx.target.loaded_tables(), strings(&["B", "C"]));
        assert!(fx.target.rows("A").is_empty());
        // Resume carries the loaded set forward.
        assert_eq!(fx.persisted(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_is_fresh() {
        let fx = fixture(source(), MemoryTarget::new());

        let result = fx.orchestrator.run(false).await.unwrap();

        assert_eq!(result.mode, RunMode::Fresh);
        assert_eq!(fx.target.loaded_tables(), strings(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_refresh_discards_previous_checkpoint() {
        let fx = fixture(source(), MemoryTarget::new().failing_table("C"));
        Checkpoint::new("previous", &set(&["A", "B", "C"]))
            .write(&fx.checkpoint())
            .unwrap();

        fx.orchestrator.run(true).await.unwrap();

        assert_eq!(fx.persisted(), set(&["A", "B"]));
    }

    #[tokio::test]
    async fn test_resume_after_complete_run_only_truncates_always_tables() {
        let fx = fixture(source(), MemoryTarget::new());
        Checkpoint::new("previous", &set(&["A", "B", "C"]))
            .write(&fx.checkpoint())
            .unwrap();

        let result = fx.orchestrator.run(false).await.unwrap();

        assert_eq!(result.tables_total, 0);
        assert_eq!(fx.target.truncations(), vec![strings(&["L"])]);
        assert!(fx.target.loaded_tables().is_empty());
        assert_eq!(result.outcome, RunOutcome::CompletedFully);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let fx = fixture(source(), MemoryTarget::new());

        fx.orchestrator.run(true).await.unwrap();
        let first: Vec<_> = ["A", "B", "C"].iter().map(|t| fx.target.rows(t)).collect();
        fx.orchestrator.run(true).await.unwrap();
        let second: Vec<_> = ["A", "B", "C"].iter().map(|t| fx.target.rows(t)).collect();

        assert_eq!(first, second);
        assert_eq!(fx.persisted(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_script_failure_stops_remaining_scripts() {
        let fx = fixture(source(), MemoryTarget::new().failing_script("refresh_s2"));

        let result = fx.orchestrator.run(true).await.unwrap();

        assert_eq!(result.outcome, RunOutcome::FailedAtInitialization);
        assert_eq!(result.scripts_executed, strings(&["s1"]));
        assert_eq!(result.failed_script.as_deref(), Some("s2"));
        assert!(result.script_error.as_deref().unwrap().contains("s2"));
        assert_eq!(fx.target.scripts(), strings(&["CALL refresh_s1();"]));
        // Data and checkpoint are kept.
        assert_eq!(fx.persisted(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_missing_script_is_fatal_before_truncation() {
        let fx = fixture(source(), MemoryTarget::new());
        fs::remove_file(fx.dir.path().join("sql/warehouse/s3.sql")).unwrap();

        let err = fx.orchestrator.run(true).await.unwrap_err();

        assert!(matches!(err, PortError::Config(_)));
        assert!(err.to_string().contains("'s3'"));
        assert!(fx.target.truncations().is_empty());
        assert!(fx.target.scripts().is_empty());
    }

    #[tokio::test]
    async fn test_truncate_failure_is_fatal() {
        let fx = fixture(source(), MemoryTarget::new());
        fx.target.fail_next_truncate("A");

        let err = fx.orchestrator.run(true).await.unwrap_err();

        assert!(matches!(err, PortError::Data { .. }));
        assert!(fx.target.loaded_tables().is_empty());
        assert!(!fx.checkpoint().exists());
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_leave_truncated_tables_checkpointed() {
        let fx = fixture(source(), MemoryTarget::new());
        fx.orchestrator.run(true).await.unwrap();
        assert_eq!(fx.persisted(), set(&["A", "B", "C"]));

        // A and B are emptied, then truncation of C fails.
        fx.target.fail_next_truncate("C");
        let err = fx.orchestrator.run(true).await.unwrap_err();
        assert!(matches!(err, PortError::Data { .. }));
        assert!(fx.target.rows("A").is_empty());
        assert!(fx.target.rows("B").is_empty());
        assert!(fx.persisted().is_empty());

        let result = fx.orchestrator.run(false).await.unwrap();

        assert_eq!(result.mode, RunMode::Resume);
        assert!(result.tables_skipped.is_empty());
        assert_eq!(result.outcome, RunOutcome::CompletedFully);
        assert_eq!(fx.target.rows("A").len(), 3);
        assert_eq!(fx.target.rows("B").len(), 4);
        assert_eq!(fx.target.rows("C").len(), 5);
        assert_eq!(fx.persisted(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_missing_query_fails_only_that_table() {
        let fx = fixture(source(), MemoryTarget::new());
        fs::remove_file(fx.dir.path().join("sql/erp/B.sql")).unwrap();
        let catalog =
            SqlCatalog::scan(&fx.dir.path().join("sql"), &["erp"], "warehouse").unwrap();
        let orchestrator = Orchestrator::from_parts(
            config(fx.dir.path(), 1),
            catalog,
            ConnectionRegistry::from_parts(
                vec![SourceHandle::new("erp", false, fx.source.clone())],
                fx.target.clone(),
            ),
        );

        let result = orchestrator.run(true).await.unwrap();

        assert_eq!(result.failed_tables, strings(&["B"]));
        assert!(result.tables[1].source.is_none());
        assert_eq!(fx.target.loaded_tables(), strings(&["A", "C"]));
    }

    #[tokio::test]
    async fn test_view_based_load() {
        let dir = TempDir::new().unwrap();
        write_catalog(dir.path());
        let fx = fixture_with(dir, mssql_source(), MemoryTarget::new(), true, 1);

        let result = fx.orchestrator.run(true).await.unwrap();

        assert_eq!(result.outcome, RunOutcome::CompletedFully);
        let views = fx.source.views();
        assert_eq!(views.len(), 3);
        assert_eq!(views["B"], "SELECT id FROM src_b");
        assert_eq!(
            fx.source.queries(),
            strings(&["SELECT * FROM [A]", "SELECT * FROM [B]", "SELECT * FROM [C]"])
        );
        assert_eq!(fx.target.rows("B").len(), 4);
    }

    #[tokio::test]
    async fn test_view_failure_fails_only_that_table() {
        let dir = TempDir::new().unwrap();
        write_catalog(dir.path());
        let fx = fixture_with(
            dir,
            mssql_source().failing_view("A"),
            MemoryTarget::new(),
            true,
            1,
        );

        let result = fx.orchestrator.run(true).await.unwrap();

        assert_eq!(result.failed_tables, strings(&["A"]));
        assert_eq!(fx.target.loaded_tables(), strings(&["B", "C"]));
        assert_eq!(fx.persisted(), set(&["B", "C"]));
    }

    #[tokio::test]
    async fn test_concurrent_workers_report_in_plan_order() {
        let dir = TempDir::new().unwrap();
        write_catalog(dir.path());
        let fx = fixture_with(dir, source(), MemoryTarget::new().failing_table("A"), false, 4);

        let result = fx.orchestrator.run(true).await.unwrap();

        let order: Vec<_> = result.tables.iter().map(|r| r.table.clone()).collect();
        assert_eq!(order, strings(&["A", "B", "C"]));
        assert_eq!(result.failed_tables, strings(&["A"]));
        assert_eq!(fx.persisted(), set(&["B", "C"]));
        assert_eq!(fx.target.truncations().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_view_loads_read_their_own_views() {
        let dir = TempDir::new().unwrap();
        write_catalog(dir.path());
        let fx = fixture_with(dir, mssql_source(), MemoryTarget::new(), true, 3);

        let result = fx.orchestrator.run(true).await.unwrap();

        assert_eq!(result.outcome, RunOutcome::CompletedFully);
        let views = fx.source.views();
        assert_eq!(views.len(), 3);
        assert_eq!(views["A"], "SELECT id FROM src_a");
        assert_eq!(views["B"], "SELECT id FROM src_b");
        assert_eq!(views["C"], "SELECT id FROM src_c");

        let mut queries = fx.source.queries();
        queries.sort();
        assert_eq!(
            queries,
            strings(&["SELECT * FROM [A]", "SELECT * FROM [B]", "SELECT * FROM [C]"])
        );
        let loaded: Vec<_> = result.tables.iter().map(|r| (r.table.as_str(), r.rows)).collect();
        assert_eq!(loaded, vec![("A", 3), ("B", 4), ("C", 5)]);
        assert_eq!(fx.target.rows("A").len(), 3);
        assert_eq!(fx.target.rows("B").len(), 4);
        assert_eq!(fx.target.rows("C").len(), 5);
    }

    #[tokio::test]
    async fn test_checkpoint_persist_failure_is_reported() {
        let fx = fixture(source(), MemoryTarget::new());
        fs::create_dir_all(fx.checkpoint().join("occupied")).unwrap();

        let result = fx.orchestrator.run(true).await.unwrap();

        assert!(!result.checkpoint_persisted);
        assert!(result.checkpoint_error.is_some());
        assert_eq!(result.outcome, RunOutcome::CompletedFully);
        assert_eq!(result.scripts_executed.len(), 3);
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = TempDir::new().unwrap();
        write_catalog(dir.path());
        let fx = fixture_with(dir, source().unreachable(), MemoryTarget::new(), false, 1);

        let health = fx.orchestrator.health_check().await;

        assert!(!health.healthy);
        assert_eq!(health.endpoints.len(), 2);
        assert_eq!(health.endpoints[0].name, "erp");
        assert!(!health.endpoints[0].healthy);
        assert!(health.endpoints[0].error.is_some());
        assert_eq!(health.endpoints[1].role, "destination");
        assert!(health.endpoints[1].healthy);
    }

    #[tokio::test]
    async fn test_result_json() {
        let fx = fixture(source(), MemoryTarget::new().failing_table("C"));

        let result = fx.orchestrator.run(true).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert_eq!(json["mode"], "fresh");
        assert_eq!(json["outcome"], "completed_partially");
        assert_eq!(json["failed_tables"], serde_json::json!(["C"]));
        assert_eq!(json["tables"][2]["status"], "failed");
        assert_eq!(json["checkpoint_persisted"], true);
        assert!(json.get("failed_script").is_none());
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(RunOutcome::CompletedFully.exit_code(), 0);
        assert_eq!(RunOutcome::CompletedPartially.exit_code(), 4);
        assert_eq!(RunOutcome::FailedAtInitialization.exit_code(), 5);
    }
}
