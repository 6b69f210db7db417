//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{PortError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Destination validation
    let dest = &config.destination;
    if dest.name.is_empty() {
        return Err(PortError::Config("destination.name is required".into()));
    }
    if dest.host.is_empty() {
        return Err(PortError::Config("destination.host is required".into()));
    }
    if dest.database.is_empty() {
        return Err(PortError::Config("destination.database is required".into()));
    }
    if dest.user.is_empty() {
        return Err(PortError::Config("destination.user is required".into()));
    }
    if dest.r#type != "mysql" {
        return Err(PortError::Config(format!(
            "destination.type must be 'mysql', got '{}'",
            dest.r#type
        )));
    }

    // Source validation
    if config.sources.is_empty() {
        return Err(PortError::Config(
            "at least one source database is required".into(),
        ));
    }
    let mut names = HashSet::new();
    for (i, source) in config.sources.iter().enumerate() {
        if source.name.is_empty() {
            return Err(PortError::Config(format!("sources[{}].name is required", i)));
        }
        if source.host.is_empty() {
            return Err(PortError::Config(format!(
                "sources[{}].host is required ({})",
                i, source.name
            )));
        }
        if source.database.is_empty() {
            return Err(PortError::Config(format!(
                "sources[{}].database is required ({})",
                i, source.name
            )));
        }
        if source.name == dest.name {
            return Err(PortError::Config(format!(
                "source '{}' has the same name as the destination",
                source.name
            )));
        }
        if !names.insert(source.name.as_str()) {
            return Err(PortError::Config(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }
    }

    // Plan validation
    let mut seen = HashSet::new();
    for table in &config.plan.tables {
        validate_identifier(table)?;
        if !seen.insert(table.as_str()) {
            return Err(PortError::Config(format!(
                "table '{}' is listed more than once in plan.tables",
                table
            )));
        }
    }
    for table in &config.plan.always_truncate {
        validate_identifier(table)?;
    }
    for script in &config.plan.init_scripts {
        if script.is_empty() {
            return Err(PortError::Config(
                "plan.init_scripts contains an empty name".into(),
            ));
        }
    }

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(PortError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.workers == 0 {
        return Err(PortError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if config.migration.max_source_connections == 0 || config.migration.max_target_connections == 0
    {
        return Err(PortError::Config(
            "migration connection limits must be at least 1".into(),
        ));
    }

    Ok(())
}
