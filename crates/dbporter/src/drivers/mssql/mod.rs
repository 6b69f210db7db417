//! Microsoft SQL Server source driver.
//!
//! - [`MssqlDialect`]: View DDL for MSSQL
//! - [`MssqlReader`]: Source reader for MSSQL databases

mod dialect;
mod reader;

pub use dialect::MssqlDialect;
pub use reader::{MssqlReader, TiberiusConnectionManager};
