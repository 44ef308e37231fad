//! Configuration loading and validation.

mod types;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.source, "source")?;
        validate_endpoint(&self.destination, "destination")?;

        if self.selection.enabled {
            if self.selection.entries.is_empty() {
                return Err(MigrateError::Config(
                    "selection is enabled but has no entries".into(),
                ));
            }
            for entry in &self.selection.entries {
                if entry.schema.trim().is_empty() {
                    return Err(MigrateError::Config(
                        "selection entry has an empty schema name".into(),
                    ));
                }
            }
        }

        if self.transfer.bulk_timeout_secs == 0 {
            return Err(MigrateError::Config(
                "transfer.bulk_timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn validate_endpoint(endpoint: &EndpointConfig, which: &str) -> Result<()> {
    if endpoint.host.trim().is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", which)));
    }
    if endpoint.database.trim().is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.database is required",
            which
        )));
    }
    if endpoint.user.trim().is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", which)));
    }
    Ok(())
}
