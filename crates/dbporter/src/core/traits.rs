//! Core traits for moving query results from source databases into the
//! destination.
//!
//! - [`SourceReader`]: Executes DDL against a source and streams query results
//! - [`TargetWriter`]: Truncates, appends rows and runs scripts on the destination
//! - [`Dialect`]: SQL syntax strategy for view DDL on each source engine

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::value::Batch;

/// Read data from a source database.
///
/// # Streaming
///
/// [`read_query`](SourceReader::read_query) returns a channel receiver for
/// streaming batches. The reader spawns a background task holding its own
/// pooled connection, so the channel bound provides backpressure.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// SQL dialect of this source, used to build view DDL.
    fn dialect(&self) -> &dyn Dialect;

    /// Execute a statement batch that returns no rows (view DDL).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Start streaming the result set of `sql`.
    ///
    /// Batches hold at most `batch_size` rows. An error ends the stream.
    fn read_query(&self, sql: &str, batch_size: usize) -> mpsc::Receiver<Result<Batch>>;

    /// Run `SELECT 1` on a pooled connection.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type identifier (e.g., "mssql", "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Write data to the destination database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Truncate every table in `tables` on one session with foreign-key
    /// checks disabled. Checks are re-enabled even when a truncate fails.
    async fn truncate_tables(&self, tables: &[String]) -> Result<()>;

    /// Append a batch of rows to `table`, binding values as parameters.
    ///
    /// Columns are matched by the batch's column names.
    async fn write_batch(&self, table: &str, batch: Batch) -> Result<u64>;

    /// Execute a destination script verbatim.
    async fn execute_script(&self, sql: &str) -> Result<()>;

    /// Run `SELECT 1` on a pooled connection.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// SQL syntax strategy for the source engines.
///
/// Every builder validates and quotes the view name itself, so callers can
/// pass plan names straight through.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mssql", "mysql").
    fn name(&self) -> &str;

    /// Quote an identifier (table or view name).
    ///
    /// - MSSQL: `[identifier]`
    /// - MySQL: `` `identifier` ``
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Statement dropping `view` when it exists.
    fn build_drop_view(&self, view: &str) -> Result<String>;

    /// Statement creating `view` from `query`.
    ///
    /// Trailing semicolons and whitespace are stripped from `query`.
    fn build_create_view(&self, view: &str, query: &str) -> Result<String>;

    /// Query reading every column of `view`.
    fn build_select_all(&self, view: &str) -> Result<String> {
        Ok(format!("SELECT * FROM {}", self.quote_ident(view)?))
    }
}

/// Strip trailing statement terminators and whitespace from a query body.
pub fn strip_terminator(query: &str) -> &str {
    query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}
