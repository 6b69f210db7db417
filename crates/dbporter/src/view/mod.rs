//! View provisioning on source databases.
//!
//! A view-based table is extracted through a view named after the table. The
//! view is dropped if it exists and recreated from the catalog query on every
//! run, so reruns always pick up the latest query body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::core::identifier::validate_identifier;
use crate::core::traits::SourceReader;
use crate::error::Result;

type ViewKey = (String, String);

/// Creates or replaces views on source databases.
///
/// Provisions of the same `(source, view)` pair are serialized; different
/// views proceed concurrently.
#[derive(Debug, Default)]
pub struct ViewProvisioner {
    locks: Mutex<HashMap<ViewKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ViewProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop `view` on `source` if it exists, then create it from `query`.
    pub async fn provision(
        &self,
        source_name: &str,
        source: &dyn SourceReader,
        view: &str,
        query: &str,
    ) -> Result<()> {
        validate_identifier(view)?;

        let dialect = source.dialect();
        let drop_sql = dialect.build_drop_view(view)?;
        let create_sql = dialect.build_create_view(view, query)?;

        let key_lock = self.key_lock(source_name, view);
        let _guard = key_lock.lock().await;

        debug!("{}: {}", source_name, drop_sql);
        source.execute(&drop_sql).await?;
        source.execute(&create_sql).await?;
        info!("Created view {} on source {}", view, source_name);
        Ok(())
    }

    fn key_lock(&self, source_name: &str, view: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((source_name.to_string(), view.to_string()))
            .or_default()
            .clone()
    }
}
