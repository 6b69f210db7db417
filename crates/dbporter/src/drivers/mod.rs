//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server source driver
//! - [`mysql`]: MySQL source driver and the MySQL destination writer
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `SourceReader` (and `TargetWriter` for a new destination)
//! 3. Add a `SourceKind` variant and an enum variant to `DialectImpl`
//! 4. Connect it in `orchestrator::pools`

pub mod mssql;
pub mod mysql;

pub use mssql::{MssqlDialect, MssqlReader};
pub use mysql::{MysqlDialect, MysqlReader, MysqlWriter};

use crate::config::SourceKind;
use crate::core::traits::Dialect;
use crate::error::Result;

/// Enum-based static dispatch for dialects.
///
/// Readers embed one of these so `SourceReader::dialect` can hand out a
/// `&dyn Dialect` without boxing.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Mysql(MysqlDialect),
}

impl DialectImpl {
    /// Dialect for a configured source engine.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
            SourceKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.name(),
            DialectImpl::Mysql(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        match self {
            DialectImpl::Mssql(d) => d.quote_ident(name),
            DialectImpl::Mysql(d) => d.quote_ident(name),
        }
    }

    fn build_drop_view(&self, view: &str) -> Result<String> {
        match self {
            DialectImpl::Mssql(d) => d.build_drop_view(view),
            DialectImpl::Mysql(d) => d.build_drop_view(view),
        }
    }

    fn build_create_view(&self, view: &str, query: &str) -> Result<String> {
        match self {
            DialectImpl::Mssql(d) => d.build_create_view(view, query),
            DialectImpl::Mysql(d) => d.build_create_view(view, query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_kind() {
        let mssql = DialectImpl::for_kind(SourceKind::Mssql);
        assert_eq!(mssql.name(), "mssql");
        assert_eq!(mssql.quote_ident("t").unwrap(), "[t]");

        let mysql = DialectImpl::for_kind(SourceKind::Mysql);
        assert_eq!(mysql.name(), "mysql");
        assert_eq!(
            mysql.build_select_all("t").unwrap(),
            "SELECT * FROM `t`"
        );
    }
}
