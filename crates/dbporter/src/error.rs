//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum PortError {
    /// Configuration error (invalid YAML values, unknown table or script, bad identifier)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or destination unreachable, or a pooled connection could not be acquired
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// MSSQL source query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// MySQL source query error
    #[error("Source database error: {0}")]
    SourceMysql(#[from] sqlx::Error),

    /// Destination database error
    #[error("Destination database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// Extraction or insert rejected for a specific table
    #[error("Load failed for table {table}: {message}")]
    Data { table: String, message: String },

    /// Source value that cannot be represented as a row value
    #[error("Cannot convert column {column}: {message}")]
    Conversion { column: String, message: String },

    /// Destination initialization script failed
    #[error("Initialization script {script} failed: {message}")]
    Script { script: String, message: String },

    /// Checkpoint could not be written
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTIVITY_ERROR: u8 = 2;
pub const EXIT_DATABASE_ERROR: u8 = 3;
pub const EXIT_DATA_ERROR: u8 = 4;
pub const EXIT_SCRIPT_ERROR: u8 = 5;
pub const EXIT_CHECKPOINT_ERROR: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

impl PortError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        PortError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Data error
    pub fn data(table: impl Into<String>, message: impl Into<String>) -> Self {
        PortError::Data {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Conversion error
    pub fn conversion(column: impl Into<String>, message: impl ToString) -> Self {
        PortError::Conversion {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Create a Script error
    pub fn script(script: impl Into<String>, message: impl Into<String>) -> Self {
        PortError::Script {
            script: script.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            PortError::Config(_) | PortError::Yaml(_) | PortError::Json(_) => EXIT_CONFIG_ERROR,
            PortError::Pool { .. } => EXIT_CONNECTIVITY_ERROR,
            PortError::Source(_) | PortError::SourceMysql(_) | PortError::Target(_) => {
                EXIT_DATABASE_ERROR
            }
            PortError::Data { .. } | PortError::Conversion { .. } => EXIT_DATA_ERROR,
            PortError::Script { .. } => EXIT_SCRIPT_ERROR,
            PortError::Checkpoint(_) => EXIT_CHECKPOINT_ERROR,
            PortError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, PortError>;
