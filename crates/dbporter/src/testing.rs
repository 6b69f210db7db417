//! In-memory source and destination used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SourceKind;
use crate::core::traits::{strip_terminator, Dialect, SourceReader, TargetWriter};
use crate::core::value::{Batch, Row};
use crate::drivers::DialectImpl;
use crate::error::{PortError, Result};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn unquote(ident: &str) -> String {
    ident
        .trim()
        .trim_start_matches(['`', '['])
        .trim_end_matches(['`', ']'])
        .to_string()
}

/// Source database whose query results are registered up front.
///
/// Understands the view DDL both dialects emit, so view provisioning can be
/// observed through [`MemorySource::views`].
pub struct MemorySource {
    dialect: DialectImpl,
    results: HashMap<String, (Arc<[String]>, Vec<Row>)>,
    chunk_size: Option<usize>,
    fail_after: HashMap<String, usize>,
    failing_views: HashSet<String>,
    unreachable: bool,
    views: Mutex<BTreeMap<String, String>>,
    executed: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new(_name: &str, kind: SourceKind) -> Self {
        Self {
            dialect: DialectImpl::for_kind(kind),
            results: HashMap::new(),
            chunk_size: None,
            fail_after: HashMap::new(),
            failing_views: HashSet::new(),
            unreachable: false,
            views: Mutex::new(BTreeMap::new()),
            executed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn mysql(name: &str) -> Self {
        Self::new(name, SourceKind::Mysql)
    }

    pub fn mssql(name: &str) -> Self {
        Self::new(name, SourceKind::Mssql)
    }

    /// Register the result set returned for `query`.
    pub fn with_result(mut self, query: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
        self.results
            .insert(strip_terminator(query).to_string(), (columns, rows));
        self
    }

    /// Emit result sets in batches of `n` rows regardless of the requested size.
    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Fail the stream of `query` after `batches` batches.
    pub fn failing_after(mut self, query: &str, batches: usize) -> Self {
        self.fail_after
            .insert(strip_terminator(query).to_string(), batches);
        self
    }

    /// Reject `CREATE VIEW` for `view`.
    pub fn failing_view(mut self, view: &str) -> Self {
        self.failing_views.insert(view.to_string());
        self
    }

    /// Fail connectivity checks.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Views currently defined, name to body.
    pub fn views(&self) -> BTreeMap<String, String> {
        lock(&self.views).clone()
    }

    /// Statements passed to `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    /// Queries passed to `read_query`, in order.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    fn resolve(&self, sql: &str) -> Option<(String, Arc<[String]>, Vec<Row>)> {
        let key = strip_terminator(sql).to_string();
        let key = match key.strip_prefix("SELECT * FROM ") {
            Some(view) => match lock(&self.views).get(&unquote(view)) {
                Some(body) => body.clone(),
                None => key,
            },
            None => key,
        };
        self.results
            .get(&key)
            .map(|(cols, rows)| (key.clone(), Arc::clone(cols), rows.clone()))
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        lock(&self.executed).push(sql.to_string());

        if let Some(rest) = sql.strip_prefix("DROP VIEW IF EXISTS ") {
            lock(&self.views).remove(&unquote(rest));
        } else if sql.starts_with("IF OBJECT_ID(") {
            if let Some((_, name)) = sql.split_once("DROP VIEW ") {
                lock(&self.views).remove(&unquote(name));
            }
        } else if let Some(rest) = sql.strip_prefix("CREATE VIEW ") {
            let (name, body) = rest
                .split_once(" AS ")
                .ok_or_else(|| PortError::Config(format!("malformed view DDL: {}", sql)))?;
            let name = unquote(name);
            if self.failing_views.contains(&name) {
                return Err(PortError::data(name, "CREATE VIEW permission denied"));
            }
            let mut views = lock(&self.views);
            if views.contains_key(&name) {
                return Err(PortError::data(name, "There is already an object named"));
            }
            views.insert(name, body.to_string());
        }
        Ok(())
    }

    fn read_query(&self, sql: &str, batch_size: usize) -> mpsc::Receiver<Result<Batch>> {
        lock(&self.queries).push(sql.to_string());

        let Some((key, columns, rows)) = self.resolve(sql) else {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(Err(PortError::data(sql, "Invalid object name")));
            return rx;
        };

        let chunk = self.chunk_size.unwrap_or(batch_size).max(1);
        let fail_after = self.fail_after.get(&key).copied();
        let batches: Vec<Batch> = rows
            .chunks(chunk)
            .map(|c| Batch::new(Arc::clone(&columns), c.to_vec()))
            .collect();

        let (tx, rx) = mpsc::channel(batches.len() + 1);
        for (i, batch) in batches.into_iter().enumerate() {
            if fail_after == Some(i) {
                break;
            }
            let _ = tx.try_send(Ok(batch));
        }
        if fail_after.is_some() {
            let _ = tx.try_send(Err(PortError::data(key, "connection reset by peer")));
        }
        rx
    }

    async fn test_connection(&self) -> Result<()> {
        if self.unreachable {
            return Err(PortError::pool("connection refused", "testing memory source"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        self.dialect.name()
    }

    async fn close(&self) {}
}

/// Destination that keeps tables in memory and records every operation.
#[derive(Default)]
pub struct MemoryTarget {
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    appends: Mutex<Vec<(String, usize)>>,
    truncations: Mutex<Vec<Vec<String>>>,
    scripts: Mutex<Vec<String>>,
    failing_tables: HashSet<String>,
    failing_scripts: HashSet<String>,
    truncate_failure: Mutex<Option<String>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject inserts into `table`.
    pub fn failing_table(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.to_string());
        self
    }

    /// Reject scripts whose text contains `marker`.
    pub fn failing_script(mut self, marker: &str) -> Self {
        self.failing_scripts.insert(marker.to_string());
        self
    }

    /// Fail the next truncation that reaches `table`. Tables ahead of it in
    /// that call are still truncated, later calls succeed.
    pub fn fail_next_truncate(&self, table: &str) {
        *lock(&self.truncate_failure) = Some(table.to_string());
    }

    /// Rows currently in `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    /// Sizes of every append to `table`, in order.
    pub fn append_sizes(&self, table: &str) -> Vec<usize> {
        lock(&self.appends)
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }

    /// Tables appended to, in order of first append.
    pub fn loaded_tables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (t, _) in lock(&self.appends).iter() {
            if !seen.contains(t) {
                seen.push(t.clone());
            }
        }
        seen
    }

    /// Every truncate call, in order.
    pub fn truncations(&self) -> Vec<Vec<String>> {
        lock(&self.truncations).clone()
    }

    /// Scripts executed successfully, in order.
    pub fn scripts(&self) -> Vec<String> {
        lock(&self.scripts).clone()
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn truncate_tables(&self, tables: &[String]) -> Result<()> {
        lock(&self.truncations).push(tables.to_vec());
        let fail_at = {
            let mut failure = lock(&self.truncate_failure);
            if failure.as_ref().is_some_and(|t| tables.contains(t)) {
                failure.take()
            } else {
                None
            }
        };
        let mut data = lock(&self.tables);
        for t in tables {
            if fail_at.as_deref() == Some(t.as_str()) {
                return Err(PortError::data(t.clone(), "TRUNCATE: table is locked"));
            }
            data.remove(t);
        }
        Ok(())
    }

    async fn write_batch(&self, table: &str, batch: Batch) -> Result<u64> {
        if self.failing_tables.contains(table) {
            return Err(PortError::data(
                table,
                "INSERT batch: Duplicate entry '1' for key 'PRIMARY'",
            ));
        }
        let n = batch.rows.len();
        lock(&self.appends).push((table.to_string(), n));
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(batch.rows);
        Ok(n as u64)
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        if self.failing_scripts.iter().any(|m| sql.contains(m.as_str())) {
            return Err(PortError::data("script", "You have an error in your SQL syntax"));
        }
        lock(&self.scripts).push(sql.to_string());
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {}
}
