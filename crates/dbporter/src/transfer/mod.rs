//! Table loader: streams one extraction query into one destination table.
//!
//! The source reader produces batches of whatever size its driver yields.
//! The loader re-chunks them so every append except the last carries exactly
//! `batch_size` rows. No DDL is issued and no transaction spans the table, so
//! a failure part way through leaves the rows already appended in place.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::core::value::Batch;
use crate::error::Result;

/// Statistics from loading one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    /// Rows appended to the destination.
    pub rows: u64,

    /// Number of appends issued.
    pub batches: u64,

    /// Wall time of the load.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

/// Loads query results into destination tables in fixed-size appends.
#[derive(Debug, Clone)]
pub struct TableLoader {
    batch_size: usize,
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl TableLoader {
    /// Create a loader appending at most `batch_size` rows at a time.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Stream the result of `query` from `source` and append it to `dest_table`.
    ///
    /// Columns are written by the names the query returns. Errors from the
    /// source stream or the destination are returned as values.
    pub async fn load(
        &self,
        source: &dyn SourceReader,
        query: &str,
        target: &dyn TargetWriter,
        dest_table: &str,
    ) -> Result<LoadStats> {
        let start = Instant::now();
        let mut stats = LoadStats::default();
        let mut rx = source.read_query(query, self.batch_size);
        let mut pending: Option<Batch> = None;

        while let Some(batch) = rx.recv().await {
            let batch = batch?;
            match pending.as_mut() {
                Some(buffer) => buffer.rows.extend(batch.rows),
                None => pending = Some(batch),
            }

            if let Some(buffer) = pending.as_mut() {
                while buffer.len() >= self.batch_size {
                    let chunk = buffer.take_front(self.batch_size);
                    self.append(target, dest_table, chunk, &mut stats).await?;
                }
            }
        }

        if let Some(rest) = pending.filter(|b| !b.is_empty()) {
            self.append(target, dest_table, rest, &mut stats).await?;
        }

        stats.duration = start.elapsed();
        info!(
            "{}: loaded {} rows in {} batches ({:.1}s)",
            dest_table,
            stats.rows,
            stats.batches,
            stats.duration.as_secs_f64()
        );
        Ok(stats)
    }

    async fn append(
        &self,
        target: &dyn TargetWriter,
        dest_table: &str,
        chunk: Batch,
        stats: &mut LoadStats,
    ) -> Result<()> {
        let rows = target.write_batch(dest_table, chunk).await?;
        stats.rows += rows;
        stats.batches += 1;
        debug!("{}: appended batch {} ({} rows)", dest_table, stats.batches, rows);
        Ok(())
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
