//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: View DDL for MySQL sources
//! - [`MysqlReader`]: Source reader (SQLx)
//! - [`MysqlWriter`]: Destination writer (mysql_async)
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod reader;
mod writer;

pub use dialect::MysqlDialect;
pub use reader::MysqlReader;
pub use writer::MysqlWriter;
