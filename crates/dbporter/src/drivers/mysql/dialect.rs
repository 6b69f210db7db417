//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::identifier::quote_mysql;
use crate::core::traits::{strip_terminator, Dialect};
use crate::error::Result;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn build_drop_view(&self, view: &str) -> Result<String> {
        Ok(format!("DROP VIEW IF EXISTS {}", quote_mysql(view)?))
    }

    fn build_create_view(&self, view: &str, query: &str) -> Result<String> {
        Ok(format!(
            "CREATE VIEW {} AS {}",
            quote_mysql(view)?,
            strip_terminator(query)
        ))
    }
}
