//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination database every table is loaded into (MySQL).
    pub destination: DestinationConfig,

    /// Source databases, addressed by name from the SQL catalog.
    pub sources: Vec<SourceConfig>,

    /// Ordered tables, always-truncate tables and initialization scripts.
    pub plan: PlanConfig,

    /// Directory holding `<database name>/<table or script>.sql` files.
    pub sql_root: PathBuf,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Supported source engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Mssql,
    Mysql,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Mssql => "mssql",
            SourceKind::Mysql => "mysql",
        }
    }
}

/// Source database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name. Also the SQL catalog directory holding its queries.
    pub name: String,

    /// Database engine.
    pub r#type: SourceKind,

    /// Database host.
    pub host: String,

    /// Database port (default: engine default).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Extract through a named view instead of the inline query (default: false).
    #[serde(default)]
    pub use_view: bool,

    /// Encrypt the MSSQL connection (default: false).
    #[serde(default)]
    pub encrypt: bool,

    /// Trust the MSSQL server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl SourceConfig {
    /// Effective port, falling back to the engine default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.r#type {
            SourceKind::Mssql => 1433,
            SourceKind::Mysql => 3306,
        })
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("use_view", &self.use_view)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Destination database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination name. Also the SQL catalog directory holding init scripts.
    pub name: String,

    /// Database type (always "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// The declared migration plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Tables to migrate, in load order.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Destination tables truncated on every run regardless of the work list.
    #[serde(default)]
    pub always_truncate: Vec<String>,

    /// Destination scripts executed in order after the data load.
    #[serde(default)]
    pub init_scripts: Vec<String>,
}

impl PlanConfig {
    /// Whether `name` is a destination table this plan knows about.
    pub fn is_known_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name) || self.always_truncate.iter().any(|t| t == name)
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Maximum rows per destination append (default: 5000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tables loaded concurrently (default: 1, strictly sequential).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Checkpoint file location (default: system temp dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_file: Option<PathBuf>,

    /// Pool size per source database (default: 4).
    #[serde(default = "default_connections")]
    pub max_source_connections: usize,

    /// Destination pool size (default: 4).
    #[serde(default = "default_connections")]
    pub max_target_connections: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            checkpoint_file: None,
            max_source_connections: default_connections(),
            max_target_connections: default_connections(),
        }
    }
}

impl MigrationConfig {
    /// Checkpoint path, falling back to the well-known temp location.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CHECKPOINT_FILE))
    }
}

/// File name used under the system temp directory when no checkpoint path is set.
pub const DEFAULT_CHECKPOINT_FILE: &str = "dbporter-checkpoint.json";

/// Default rows per append.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_workers() -> usize {
    1
}

fn default_connections() -> usize {
    4
}
