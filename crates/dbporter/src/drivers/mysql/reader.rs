//! MySQL/MariaDB source reader implementation.
//!
//! Uses SQLx for connection pooling and streams extraction queries row by
//! row. Values are converted from the column type reported by the server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{SourceConfig, SourceKind};
use crate::core::traits::{Dialect, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{PortError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Batches buffered between the reader task and the loader.
const READ_CHANNEL_CAPACITY: usize = 4;

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    name: String,
    pool: MySqlPool,
    dialect: DialectImpl,
}

impl MysqlReader {
    /// Create a new MySQL reader from configuration.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let ssl_mode = if config.encrypt {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                PortError::pool(e, format!("creating MySQL pool for source '{}'", config.name))
            })?;

        let reader = Self {
            name: config.name.clone(),
            pool,
            dialect: DialectImpl::for_kind(SourceKind::Mysql),
        };
        reader.test_connection().await?;

        info!(
            "Connected to MySQL source '{}': {}:{}/{}",
            config.name,
            config.host,
            config.port(),
            config.database
        );

        Ok(reader)
    }

    async fn read_query_impl(
        pool: MySqlPool,
        source: String,
        sql: String,
        batch_size: usize,
        tx: mpsc::Sender<Result<Batch>>,
    ) -> Result<()> {
        let mut stream = sqlx::query(&sql).fetch(&pool);
        let mut columns: Option<Arc<[String]>> = None;
        let mut rows = Vec::with_capacity(batch_size);
        let mut total: u64 = 0;

        while let Some(row) = stream.try_next().await? {
            let cols = Arc::clone(columns.get_or_insert_with(|| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect::<Vec<_>>()
                    .into()
            }));
            rows.push(row_to_values(&row)?);

            if rows.len() >= batch_size {
                total += rows.len() as u64;
                let full = std::mem::replace(&mut rows, Vec::with_capacity(batch_size));
                if tx.send(Ok(Batch::new(cols, full))).await.is_err() {
                    return Ok(()); // Receiver dropped
                }
            }
        }

        if let Some(cols) = columns {
            if !rows.is_empty() {
                total += rows.len() as u64;
                let _ = tx.send(Ok(Batch::new(cols, rows))).await;
            }
        }

        debug!("MySQL source '{}': streamed {} rows", source, total);
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    fn read_query(&self, sql: &str, batch_size: usize) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
        let pool = self.pool.clone();
        let source = self.name.clone();
        let sql = sql.to_string();

        tokio::spawn(async move {
            let result = Self::read_query_impl(pool, source, sql, batch_size, tx.clone()).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::pool(e, format!("testing MySQL source '{}'", self.name)))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Convert a MySQL row to a vector of values using the reported column types.
fn row_to_values(row: &MySqlRow) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            values.push(SqlValue::Null);
            continue;
        }

        let type_name = col.type_info().name().to_ascii_uppercase();
        let value = convert_value(row, i, &type_name)
            .map_err(|e| PortError::conversion(col.name(), e))?;
        values.push(value);
    }
    Ok(values)
}

fn convert_value(
    row: &MySqlRow,
    i: usize,
    type_name: &str,
) -> std::result::Result<SqlValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
        "TINYINT" => SqlValue::I16(row.try_get::<i8, _>(i)?.into()),
        "TINYINT UNSIGNED" => SqlValue::I16(row.try_get::<u8, _>(i)?.into()),
        "SMALLINT" => SqlValue::I16(row.try_get::<i16, _>(i)?),
        "SMALLINT UNSIGNED" => SqlValue::I32(row.try_get::<u16, _>(i)?.into()),
        "MEDIUMINT" | "INT" => SqlValue::I32(row.try_get::<i32, _>(i)?),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => SqlValue::I64(row.try_get::<u32, _>(i)?.into()),
        "BIGINT" => SqlValue::I64(row.try_get::<i64, _>(i)?),
        "BIGINT UNSIGNED" => SqlValue::U64(row.try_get::<u64, _>(i)?),
        "FLOAT" => SqlValue::F32(row.try_get::<f32, _>(i)?),
        "DOUBLE" => SqlValue::F64(row.try_get::<f64, _>(i)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(i)?),
        "DATE" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(i)?),
        "TIME" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(i)?),
        "DATETIME" => SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(i)?),
        "TIMESTAMP" => SqlValue::DateTime(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(i)?
                .naive_utc(),
        ),
        "YEAR" => SqlValue::I16(row.try_get_unchecked::<i16, _>(i)?),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        // CHAR, VARCHAR, TEXT variants, ENUM, SET, JSON
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}
