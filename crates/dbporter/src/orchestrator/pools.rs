//! Connection registry for the configured source databases and the
//! destination.
//!
//! Sources are held as trait objects keyed by name, so the orchestrator never
//! needs to know which engine serves a table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, SourceConfig, SourceKind};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::drivers::{MssqlReader, MysqlReader, MysqlWriter};
use crate::error::{PortError, Result};

/// A connected source database.
#[derive(Clone)]
pub struct SourceHandle {
    pub name: String,

    /// Extract through views instead of inline queries.
    pub use_view: bool,

    pub reader: Arc<dyn SourceReader>,
}

impl SourceHandle {
    pub fn new(name: impl Into<String>, use_view: bool, reader: Arc<dyn SourceReader>) -> Self {
        Self {
            name: name.into(),
            use_view,
            reader,
        }
    }

    /// Connect one configured source.
    pub async fn connect(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let reader: Arc<dyn SourceReader> = match config.r#type {
            SourceKind::Mssql => Arc::new(MssqlReader::new(config, max_conns as u32).await?),
            SourceKind::Mysql => Arc::new(MysqlReader::new(config, max_conns).await?),
        };
        Ok(Self::new(&config.name, config.use_view, reader))
    }
}

/// Every connection a run needs.
pub struct ConnectionRegistry {
    /// Source names in configuration order.
    order: Vec<String>,
    sources: HashMap<String, SourceHandle>,
    target: Arc<dyn TargetWriter>,
}

impl ConnectionRegistry {
    /// Connect every source and the destination.
    ///
    /// Any unreachable endpoint fails the whole call with a connectivity
    /// error before anything is truncated.
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut sources = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            sources
                .push(SourceHandle::connect(source, config.migration.max_source_connections).await?);
        }

        let target = MysqlWriter::new(
            &config.destination,
            config.migration.max_target_connections,
        )
        .await?;

        info!(
            "Connected to {} source database(s) and destination '{}'",
            sources.len(),
            config.destination.name
        );
        Ok(Self::from_parts(sources, Arc::new(target)))
    }

    /// Build a registry from already connected endpoints.
    pub fn from_parts(sources: Vec<SourceHandle>, target: Arc<dyn TargetWriter>) -> Self {
        let order = sources.iter().map(|s| s.name.clone()).collect();
        let sources = sources.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            order,
            sources,
            target,
        }
    }

    /// Look up a source by name.
    pub fn source(&self, name: &str) -> Result<&SourceHandle> {
        self.sources
            .get(name)
            .ok_or_else(|| PortError::Config(format!("unknown source database '{}'", name)))
    }

    /// Sources in configuration order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceHandle> {
        self.order.iter().filter_map(|name| self.sources.get(name))
    }

    pub fn target(&self) -> &Arc<dyn TargetWriter> {
        &self.target
    }

    /// Close every pool.
    pub async fn close(&self) {
        for source in self.sources() {
            source.reader.close().await;
        }
        self.target.close().await;
    }
}
