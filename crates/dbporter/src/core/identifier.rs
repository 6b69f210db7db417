//! Identifier validation and quoting.
//!
//! Table and view names end up spliced into DDL (`TRUNCATE`, `CREATE VIEW`,
//! `INSERT INTO`) because identifiers cannot be bound as parameters. Every name
//! is validated first and then quoted with the dialect's escaping rules.
//!
//! # Security
//!
//! Names are only ever taken from the migration plan. [`validate_plan_table`]
//! rejects anything the plan does not declare, so a stray catalog file cannot
//! name an arbitrary destination object.

use crate::config::PlanConfig;
use crate::error::{PortError, Result};

/// Maximum identifier length (SQL Server allows 128, MySQL 64).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `PortError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PortError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(PortError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(PortError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Validate a name used as a destination table or view against the plan.
///
/// The name must be a valid identifier and be listed in `plan.tables` or
/// `plan.always_truncate`.
pub fn validate_plan_table(name: &str, plan: &PlanConfig) -> Result<()> {
    validate_identifier(name)?;
    if !plan.is_known_table(name) {
        return Err(PortError::Config(format!(
            "'{}' is not declared in plan.tables or plan.always_truncate",
            name
        )));
    }
    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Render a SQL Server Unicode string literal (`N'...'`).
///
/// Used where a name is passed as a value, e.g. `OBJECT_ID(N'name', N'V')`.
pub fn mssql_string_literal(value: &str) -> Result<String> {
    validate_identifier(value)?;
    Ok(format!("N'{}'", value.replace('\'', "''")))
}
