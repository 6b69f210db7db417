//! # dbporter
//!
//! Bulk table migration from several source databases into one MySQL
//! destination, with checkpoint resume.
//!
//! This library provides:
//!
//! - **Full refresh** runs that truncate and reload every planned table
//! - **Resume** runs that retry only tables missing from the last checkpoint
//! - **View-based extraction** that recreates a view per table on the source
//! - **Continue-on-error** loading with per-table results
//! - **Initialization scripts** executed on the destination after the load
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbporter::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> dbporter::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(true).await?;
//!     println!("Migrated {} rows ({})", result.rows_transferred, result.outcome);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod state;
pub mod transfer;
pub mod view;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use catalog::SqlCatalog;
pub use config::{Config, DestinationConfig, MigrationConfig, PlanConfig, SourceConfig, SourceKind};
pub use core::{Batch, Row, SqlValue};
pub use error::{PortError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationResult, Orchestrator, RunMode, RunOutcome, RunPlan,
};
pub use pipeline::{JobResult, TableJob};
pub use state::CheckpointStore;
pub use transfer::{LoadStats, TableLoader};
pub use view::ViewProvisioner;
