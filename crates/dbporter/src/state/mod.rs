//! Checkpoint store for resume capability.
//!
//! The checkpoint is the set of tables whose extraction and load completed
//! without error. It is accumulated in memory while tables load and written
//! once, atomically, at the end of the data-load phase.
//!
//! # File format
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "run_id": "9b3c...",
//!   "written_at": "2024-05-01T02:00:00Z",
//!   "tables": ["customers", "orders"],
//!   "checksum": "<sha256 hex>"
//! }
//! ```
//!
//! An empty `tables` array records a prior run with no successes, which is
//! different from having no checkpoint at all.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{PortError, Result};

/// Current checkpoint file format version.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Durable checkpoint document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// File format version.
    pub format_version: u32,

    /// Run that wrote this checkpoint.
    pub run_id: String,

    /// When the checkpoint was written.
    pub written_at: DateTime<Utc>,

    /// Tables that completed successfully, sorted.
    pub tables: Vec<String>,

    /// SHA-256 over the version and table names.
    pub checksum: String,
}

impl Checkpoint {
    /// Create a checkpoint for `tables`.
    pub fn new(run_id: impl Into<String>, tables: &BTreeSet<String>) -> Self {
        let tables: Vec<String> = tables.iter().cloned().collect();
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            run_id: run_id.into(),
            written_at: Utc::now(),
            checksum: compute_checksum(CHECKPOINT_FORMAT_VERSION, &tables),
            tables,
        }
    }

    /// Table names as a set.
    pub fn table_set(&self) -> BTreeSet<String> {
        self.tables.iter().cloned().collect()
    }

    /// Check the format version and checksum.
    pub fn verify(&self) -> Result<()> {
        if self.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(PortError::Checkpoint(format!(
                "unsupported checkpoint format version {} (expected {})",
                self.format_version, CHECKPOINT_FORMAT_VERSION
            )));
        }

        let expected = compute_checksum(self.format_version, &self.tables);
        if self.checksum != expected {
            return Err(PortError::Checkpoint(
                "checkpoint integrity check failed: checksum mismatch".to_string(),
            ));
        }
        Ok(())
    }

    /// Read and verify a checkpoint file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let checkpoint: Self = serde_json::from_str(&content)?;
        checkpoint.verify()?;
        Ok(checkpoint)
    }

    /// Write the checkpoint (atomic write: temp file, then rename).
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }
}

fn compute_checksum(version: u32, tables: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(tables.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory success accumulator backed by a checkpoint file.
///
/// Shared across table jobs; every method takes `&self`.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    succeeded: Mutex<BTreeSet<String>>,
}

impl CheckpointStore {
    /// Create a store writing to `path`, with an empty accumulator.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            succeeded: Mutex::new(BTreeSet::new()),
        }
    }

    /// Checkpoint file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previously persisted set of successful tables.
    ///
    /// Returns `None` when there is no usable checkpoint. A missing,
    /// unreadable, corrupt or tampered file is never fatal.
    pub fn load(&self) -> Option<BTreeSet<String>> {
        if !self.path.exists() {
            info!("No checkpoint found at {}", self.path.display());
            return None;
        }

        match Checkpoint::read(&self.path) {
            Ok(checkpoint) => {
                info!(
                    "Loaded checkpoint from {} ({} tables, run {})",
                    self.path.display(),
                    checkpoint.tables.len(),
                    checkpoint.run_id
                );
                Some(checkpoint.table_set())
            }
            Err(e) => {
                warn!(
                    "Ignoring unusable checkpoint {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Initialize the accumulator from a loaded checkpoint.
    pub fn seed(&self, tables: BTreeSet<String>) {
        *self.lock() = tables;
    }

    /// Record that `table` completed successfully. Idempotent.
    pub fn record_success(&self, table: &str) {
        if self.lock().insert(table.to_string()) {
            debug!("Checkpoint: recorded {}", table);
        }
    }

    /// Drop `table` from the accumulated set.
    pub fn forget(&self, table: &str) {
        if self.lock().remove(table) {
            debug!("Checkpoint: cleared {}", table);
        }
    }

    /// Snapshot of the accumulated set.
    pub fn succeeded(&self) -> BTreeSet<String> {
        self.lock().clone()
    }

    /// Write the accumulated set, replacing any previous checkpoint.
    pub fn persist(&self, run_id: &str) -> Result<()> {
        let checkpoint = Checkpoint::new(run_id, &self.succeeded());
        checkpoint.write(&self.path).map_err(|e| {
            PortError::Checkpoint(format!("writing {}: {}", self.path.display(), e))
        })?;
        info!(
            "Checkpoint written to {} ({} tables)",
            self.path.display(),
            checkpoint.tables.len()
        );
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.succeeded.lock().unwrap_or_else(|e| e.into_inner())
    }
}
