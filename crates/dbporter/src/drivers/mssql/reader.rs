//! MSSQL source reader implementation.
//!
//! Streams arbitrary extraction queries from SQL Server using Tiberius with
//! bb8 connection pooling. Column types are taken from the TDS metadata of
//! each row, so no schema lookup is needed before reading.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::config::{SourceConfig, SourceKind};
use crate::core::traits::{Dialect, SourceReader};
use crate::core::value::{Batch, Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{PortError, Result};

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection acquisition timeout from pool (30 seconds).
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connection timeout (5 minutes).
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum connection lifetime (30 minutes).
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Batches buffered between the reader task and the loader.
const READ_CHANNEL_CAPACITY: usize = 4;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }
        if self.config.trust_server_cert {
            config.trust_cert();
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        // Long extractions can idle on the wire while the destination catches up.
        let tcp = match tcp.into_std() {
            Ok(std_tcp) => {
                let socket = socket2::Socket::from(std_tcp);
                let keepalive = socket2::TcpKeepalive::new()
                    .with_time(TCP_KEEPALIVE_INTERVAL)
                    .with_interval(TCP_KEEPALIVE_INTERVAL);
                if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
                    warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
                }

                let std_tcp: std::net::TcpStream = socket.into();
                std_tcp.set_nonblocking(true).ok();
                TcpStream::from_std(std_tcp).map_err(|e| tiberius::error::Error::Io {
                    kind: e.kind(),
                    message: format!("Failed to convert socket: {}", e),
                })?
            }
            Err(e) => {
                return Err(tiberius::error::Error::Io {
                    kind: e.kind(),
                    message: format!("Failed to configure MSSQL socket: {}", e),
                })
            }
        };

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL source reader.
pub struct MssqlReader {
    name: String,
    pool: Pool<TiberiusConnectionManager>,
    dialect: DialectImpl,
}

impl MssqlReader {
    /// Create a new MSSQL reader with the specified pool size.
    ///
    /// Fails with a connectivity error when the server is unreachable.
    pub async fn new(config: &SourceConfig, max_size: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| {
                PortError::pool(e, format!("creating MSSQL pool for source '{}'", config.name))
            })?;

        let reader = Self {
            name: config.name.clone(),
            pool,
            dialect: DialectImpl::for_kind(SourceKind::Mssql),
        };
        reader.test_connection().await?;

        info!(
            "Connected to MSSQL source '{}': {}:{}/{} (pool_size={})",
            config.name,
            config.host,
            config.port(),
            config.database,
            max_size
        );

        Ok(reader)
    }

    /// Get a pooled connection.
    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool.get().await.map_err(|e| {
            PortError::pool(
                e,
                format!("getting MSSQL connection for source '{}'", self.name),
            )
        })
    }
}

#[async_trait]
impl SourceReader for MssqlReader {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut client = self.get_client().await?;
        client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    fn read_query(&self, sql: &str, batch_size: usize) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
        let pool = self.pool.clone();
        let name = self.name.clone();
        let sql = sql.to_string();

        tokio::spawn(async move {
            if let Err(e) = read_query_internal(pool, &name, &sql, batch_size, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn test_connection(&self) -> Result<()> {
        let mut client = self.get_client().await?;
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn close(&self) {
        // bb8 pool handles cleanup automatically
    }
}

/// Stream the rows of `sql` through `tx` in batches of at most `batch_size`.
async fn read_query_internal(
    pool: Pool<TiberiusConnectionManager>,
    source: &str,
    sql: &str,
    batch_size: usize,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let mut client = pool.get().await.map_err(|e| {
        PortError::pool(e, format!("getting MSSQL read connection for '{}'", source))
    })?;

    let mut stream = client.simple_query(sql).await?.into_row_stream();
    let mut columns: Option<Arc<[String]>> = None;
    let mut rows: Vec<Row> = Vec::with_capacity(batch_size);
    let mut total: u64 = 0;

    while let Some(row) = stream.try_next().await? {
        let cols = columns.get_or_insert_with(|| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
                .into()
        });
        let cols = Arc::clone(cols);

        let mut values = Vec::with_capacity(cols.len());
        for (idx, data) in row.into_iter().enumerate() {
            values.push(
                convert_column(data).map_err(|e| PortError::conversion(cols[idx].as_str(), e))?,
            );
        }
        rows.push(values);

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

    debug!("MSSQL source '{}': streamed {} rows", source, total);
    Ok(())
}

/// Convert one TDS column value into a [`SqlValue`].
fn convert_column(data: ColumnData<'static>) -> std::result::Result<SqlValue, String> {
    let value = match &data {
        ColumnData::U8(v) => SqlValue::from(v.map(i16::from)),
        ColumnData::I16(v) => SqlValue::from(*v),
        ColumnData::I32(v) => SqlValue::from(*v),
        ColumnData::I64(v) => SqlValue::from(*v),
        ColumnData::F32(v) => SqlValue::from(*v),
        ColumnData::F64(v) => SqlValue::from(*v),
        ColumnData::Bit(v) => SqlValue::from(*v),
        ColumnData::Guid(v) => SqlValue::from(*v),
        ColumnData::String(v) => SqlValue::from(v.as_ref().map(|s| s.to_string())),
        ColumnData::Binary(v) => SqlValue::from(v.as_ref().map(|b| b.to_vec())),
        ColumnData::Xml(v) => SqlValue::from(v.clone().map(|x| x.into_owned().into_string())),
        ColumnData::Numeric(_) => from_sql::<Decimal>(&data)?,
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            from_sql::<NaiveDateTime>(&data)?
        }
        ColumnData::Date(_) => from_sql::<NaiveDate>(&data)?,
        ColumnData::Time(_) => from_sql::<NaiveTime>(&data)?,
        ColumnData::DateTimeOffset(_) => from_sql::<DateTime<FixedOffset>>(&data)?,
    };
    Ok(value)
}

fn from_sql<'a, T>(data: &'a ColumnData<'static>) -> std::result::Result<SqlValue, String>
where
    T: FromSql<'a> + Into<SqlValue>,
{
    T::from_sql(data)
        .map(SqlValue::from)
        .map_err(|e| e.to_string())
}
