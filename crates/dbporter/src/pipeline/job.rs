//! Table job (Command pattern) for one table of the migration plan.
//!
//! A `TableJob` carries everything needed to load one destination table: the
//! owning source, the extraction query read from the catalog, and whether
//! the extraction goes through a view.

use serde::Serialize;

use crate::catalog::SqlCatalog;
use crate::core::traits::Dialect;
use crate::error::Result;
use crate::transfer::LoadStats;

/// One table to extract and load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableJob {
    /// Destination table name. Also the view name for view-based extraction.
    pub table: String,

    /// Source database owning the extraction query.
    pub source: String,

    /// Extraction query text, verbatim from the catalog.
    pub query: String,

    /// Extract through a view instead of the inline query.
    pub use_view: bool,
}

impl TableJob {
    /// Resolve the job for `table` from the catalog.
    pub fn resolve(table: &str, catalog: &SqlCatalog) -> Result<Self> {
        let (source, query) = catalog.read_table_sql(table)?;
        Ok(Self {
            table: table.to_string(),
            source,
            query,
            use_view: false,
        })
    }

    /// Set whether the job extracts through a view.
    pub fn with_view(mut self, use_view: bool) -> Self {
        self.use_view = use_view;
        self
    }

    /// Name of the view provisioned for this job.
    pub fn view_name(&self) -> &str {
        &self.table
    }

    /// Query the loader streams from the source.
    ///
    /// View-based jobs read every column of the view, others run the catalog
    /// query directly.
    pub fn extraction_query(&self, dialect: &dyn Dialect) -> Result<String> {
        if self.use_view {
            dialect.build_select_all(self.view_name())
        } else {
            Ok(self.query.clone())
        }
    }
}

/// Final state of a table job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

/// Result of executing a table job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// Destination table.
    pub table: String,

    /// Owning source, when the job resolved far enough to know it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub status: JobStatus,

    /// Rows appended by a completed load; zero for failed jobs.
    pub rows: u64,

    /// Appends issued.
    pub batches: u64,

    pub duration_seconds: f64,

    /// Error message if the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// Result for a job whose load completed.
    pub fn succeeded(job: &TableJob, stats: &LoadStats) -> Self {
        Self {
            table: job.table.clone(),
            source: Some(job.source.clone()),
            status: JobStatus::Succeeded,
            rows: stats.rows,
            batches: stats.batches,
            duration_seconds: stats.duration.as_secs_f64(),
            error: None,
        }
    }

    /// Result for a job that failed at any step.
    pub fn failed(table: &str, source: Option<&str>, error: impl ToString) -> Self {
        Self {
            table: table.to_string(),
            source: source.map(str::to_string),
            status: JobStatus::Failed,
            rows: 0,
            batches: 0,
            duration_seconds: 0.0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MssqlDialect, MysqlDialect};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn catalog() -> (TempDir, SqlCatalog) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("erp")).unwrap();
        fs::write(
            dir.path().join("erp/orders.sql"),
            "SELECT id, total FROM dbo.orders;\n",
        )
        .unwrap();
        let catalog = SqlCatalog::scan(dir.path(), &["erp"], "warehouse").unwrap();
        (dir, catalog)
    }

    #[test]
    fn test_resolve_reads_query_verbatim() {
        let (_dir, catalog) = catalog();
        let job = TableJob::resolve("orders", &catalog).unwrap();
        assert_eq!(job.source, "erp");
        assert_eq!(job.query, "SELECT id, total FROM dbo.orders;\n");
        assert!(!job.use_view);
    }

    #[test]
    fn test_resolve_unknown_table() {
        let (_dir, catalog) = catalog();
        assert!(TableJob::resolve("invoices", &catalog).is_err());
    }

    #[test]
    fn test_extraction_query() {
        let (_dir, catalog) = catalog();
        let job = TableJob::resolve("orders", &catalog).unwrap();
        assert_eq!(
            job.extraction_query(&MssqlDialect::new()).unwrap(),
            "SELECT id, total FROM dbo.orders;\n"
        );

        let job = job.with_view(true);
        assert_eq!(
            job.extraction_query(&MssqlDialect::new()).unwrap(),
            "SELECT * FROM [orders]"
        );
        assert_eq!(
            job.extraction_query(&MysqlDialect::new()).unwrap(),
            "SELECT * FROM `orders`"
        );
    }

    #[test]
    fn test_job_result_serialization() {
        let (_dir, catalog) = catalog();
        let job = TableJob::resolve("orders", &catalog).unwrap();
        let stats = LoadStats {
            rows: 12,
            batches: 1,
            duration: Duration::from_millis(500),
        };

        let ok = serde_json::to_value(JobResult::succeeded(&job, &stats)).unwrap();
        assert_eq!(ok["status"], "succeeded");
        assert_eq!(ok["rows"], 12);
        assert!(ok.get("error").is_none());

        let failed = JobResult::failed("orders", None, "boom");
        assert!(!failed.is_success());
        assert_eq!(failed.rows, 0);
        let failed = serde_json::to_value(failed).unwrap();
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error"], "boom");
        assert!(failed.get("source").is_none());
    }
}
