//! SQL file catalog.
//!
//! Extraction queries and initialization scripts live as one `.sql` file each
//! under `sql_root`. The name of the directory holding a file decides who
//! owns it: a source name makes it a table query for that source, the
//! destination name makes it an initialization script. The file stem is the
//! table or script name.
//!
//! ```text
//! sql/
//!   erp/orders.sql            -> table "orders" from source "erp"
//!   crm/customers.sql         -> table "customers" from source "crm"
//!   warehouse/build_facts.sql -> init script "build_facts"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PortError, Result};

/// A table query found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// Source database owning the query.
    pub source: String,
    /// Path of the `.sql` file.
    pub path: PathBuf,
}

/// Index of table queries and initialization scripts.
#[derive(Debug, Default)]
pub struct SqlCatalog {
    tables: HashMap<String, TableEntry>,
    scripts: HashMap<String, PathBuf>,
}

impl SqlCatalog {
    /// Build the catalog for a configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sources: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
        Self::scan(&config.sql_root, &sources, &config.destination.name)
    }

    /// Walk `root` and index every `.sql` file by owner and stem.
    ///
    /// Files are visited in sorted path order. When two files resolve to the
    /// same table or script name the first one wins.
    pub fn scan(root: &Path, sources: &[&str], destination: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(PortError::Config(format!(
                "sql_root '{}' is not a directory",
                root.display()
            )));
        }

        let mut files = Vec::new();
        collect_sql_files(root, &mut files)?;

        let mut catalog = SqlCatalog::default();
        for path in files {
            let (Some(owner), Some(stem)) = (
                path.parent()
                    .and_then(Path::file_name)
                    .and_then(|n| n.to_str()),
                path.file_stem().and_then(|s| s.to_str()),
            ) else {
                continue;
            };

            if sources.contains(&owner) {
                if let Some(existing) = catalog.tables.get(stem) {
                    warn!(
                        "Ignoring {}: table '{}' already defined by {}",
                        path.display(),
                        stem,
                        existing.path.display()
                    );
                    continue;
                }
                catalog.tables.insert(
                    stem.to_string(),
                    TableEntry {
                        source: owner.to_string(),
                        path: path.clone(),
                    },
                );
            } else if owner == destination {
                if let Some(existing) = catalog.scripts.get(stem) {
                    warn!(
                        "Ignoring {}: script '{}' already defined by {}",
                        path.display(),
                        stem,
                        existing.display()
                    );
                    continue;
                }
                catalog.scripts.insert(stem.to_string(), path.clone());
            } else {
                debug!("Skipping {}: '{}' is not a configured database", path.display(), owner);
            }
        }

        debug!(
            "SQL catalog: {} table queries, {} scripts under {}",
            catalog.tables.len(),
            catalog.scripts.len(),
            root.display()
        );
        Ok(catalog)
    }

    /// Look up the owning source and query file for a table.
    pub fn resolve_table(&self, name: &str) -> Result<&TableEntry> {
        self.tables.get(name).ok_or_else(|| {
            PortError::Config(format!("no extraction query found for table '{}'", name))
        })
    }

    /// Look up the file of an initialization script.
    pub fn resolve_script(&self, name: &str) -> Result<&Path> {
        self.scripts
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                PortError::Config(format!("no initialization script found named '{}'", name))
            })
    }

    /// Read the extraction query of a table, returning its owning source.
    pub fn read_table_sql(&self, name: &str) -> Result<(String, String)> {
        let entry = self.resolve_table(name)?;
        let sql = fs::read_to_string(&entry.path).map_err(|e| {
            PortError::Config(format!(
                "reading query for table '{}' ({}): {}",
                name,
                entry.path.display(),
                e
            ))
        })?;
        Ok((entry.source.clone(), sql))
    }

    /// Read an initialization script verbatim.
    pub fn read_script_sql(&self, name: &str) -> Result<String> {
        let path = self.resolve_script(name)?;
        fs::read_to_string(path).map_err(|e| {
            PortError::Config(format!(
                "reading script '{}' ({}): {}",
                name,
                path.display(),
                e
            ))
        })
    }

    /// Number of indexed table queries.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of indexed scripts.
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }
}

fn collect_sql_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_sql_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            out.push(path);
        }
    }
    Ok(())
}
