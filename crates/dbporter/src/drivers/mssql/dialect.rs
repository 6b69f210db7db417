//! MSSQL SQL dialect (Strategy pattern).
//!
//! View DDL for SQL Server sources. `CREATE VIEW` must be the first statement
//! of a batch, so the drop and the create are produced as separate batches.

use crate::core::identifier::{mssql_string_literal, quote_mssql};
use crate::core::traits::{strip_terminator, Dialect};
use crate::error::Result;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn build_drop_view(&self, view: &str) -> Result<String> {
        Ok(format!(
            "IF OBJECT_ID({}, N'V') IS NOT NULL DROP VIEW {}",
            mssql_string_literal(view)?,
            quote_mssql(view)?
        ))
    }

    fn build_create_view(&self, view: &str, query: &str) -> Result<String> {
        Ok(format!(
            "CREATE VIEW {} AS {}",
            quote_mssql(view)?,
            strip_terminator(query)
        ))
    }
}
