//! MySQL/MariaDB destination writer implementation.
//!
//! Uses mysql_async for connection pooling. Rows are appended with multi-row
//! `INSERT` statements whose values are bound as parameters.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, Value};
use tracing::{debug, info, warn};

use crate::config::DestinationConfig;
use crate::core::identifier::quote_mysql;
use crate::core::traits::TargetWriter;
use crate::core::value::{Batch, SqlValue};
use crate::error::{PortError, Result};

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL destination writer implementation using mysql_async.
pub struct MysqlWriter {
    pool: Pool,
}

impl MysqlWriter {
    /// Create a new MySQL writer from configuration.
    pub async fn new(config: &DestinationConfig, max_conns: usize) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => {
                Some(SslOpts::default())
            }
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to Preferred",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            PortError::Config(format!("invalid destination pool size {}", max_conns))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();

        let writer = Self {
            pool: Pool::new(opts),
        };
        writer.test_connection().await?;

        info!(
            "Connected to MySQL destination '{}': {}:{}/{}",
            config.name, config.host, config.port, config.database
        );

        Ok(writer)
    }

    async fn get_conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| PortError::pool(e, "getting MySQL destination connection"))
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn truncate_tables(&self, tables: &[String]) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }

        let statements = tables
            .iter()
            .map(|t| Ok(format!("TRUNCATE TABLE {}", quote_mysql(t)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.get_conn().await?;
        conn.query_drop("SET FOREIGN_KEY_CHECKS = 0").await?;

        let mut outcome = Ok(());
        for (table, sql) in tables.iter().zip(&statements) {
            debug!("Truncating {}", table);
            if let Err(e) = conn.query_drop(sql).await {
                outcome = Err(PortError::data(table.as_str(), format!("TRUNCATE: {}", e)));
                break;
            }
        }

        // Re-enable on the same session even when a truncate failed.
        let restore = conn.query_drop("SET FOREIGN_KEY_CHECKS = 1").await;
        outcome?;
        restore?;

        info!("Truncated {} destination tables", tables.len());
        Ok(())
    }

    async fn write_batch(&self, table: &str, batch: Batch) -> Result<u64> {
        if batch.rows.is_empty() {
            return Ok(0);
        }

        let num_cols = batch.columns.len();
        if num_cols == 0 {
            return Err(PortError::data(table, "result set has no columns"));
        }

        let row_count = batch.rows.len() as u64;
        let max_rows_per_insert = (MYSQL_MAX_PLACEHOLDERS / num_cols).max(1);
        let mut conn = self.get_conn().await?;

        for chunk in batch.rows.chunks(max_rows_per_insert) {
            let sql = build_insert_sql(table, &batch.columns, chunk.len())?;
            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            conn.exec_drop(&sql, params)
                .await
                .map_err(|e| PortError::data(table, format!("INSERT batch: {}", e)))?;
        }

        debug!("MySQL: wrote {} rows to {}", row_count, table);
        Ok(row_count)
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| PortError::pool(e, "testing MySQL destination connection"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// Build a multi-row `INSERT` for `rows` rows of `columns`.
fn build_insert_sql(table: &str, columns: &[String], rows: usize) -> Result<String> {
    let col_list = columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let placeholders_per_row = format!("({})", vec!["?"; columns.len()].join(", "));
    let all_placeholders = vec![placeholders_per_row; rows].join(", ");

    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_mysql(table)?,
        col_list,
        all_placeholders
    ))
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I16(i) => Value::from(*i),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::U64(u) => Value::from(*u),
        SqlValue::F32(f) => Value::from(*f),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Bytes(b) => Value::from(b.as_slice()),
        SqlValue::Uuid(u) => Value::from(u.to_string()),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::DateTime(dt) => datetime_value(dt),
        SqlValue::DateTimeOffset(dto) => datetime_value(&dto.naive_utc()),
        SqlValue::Date(d) => date_value(d),
        SqlValue::Time(t) => time_value(t),
    }
}

fn datetime_value(dt: &NaiveDateTime) -> Value {
    Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1_000,
    )
}

fn date_value(d: &NaiveDate) -> Value {
    Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
}

fn time_value(t: &NaiveTime) -> Value {
    Value::Time(
        false,
        0,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
        t.nanosecond() / 1_000,
    )
}
