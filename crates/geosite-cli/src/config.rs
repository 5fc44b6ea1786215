//! Configuration loading for CLI commands

use anyhow::{Context, Result};
use geosite_core::config::{CliConfigOverrides, LayeredConfig};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "geosite.toml";

/// Defaults, then the config file, then `GEOSITE_*` environment variables.
///
/// An explicit path must exist; the default file is optional.
pub fn load_layered(config_path: Option<&Path>) -> Result<LayeredConfig> {
    let path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let config = match path {
        Some(path) => LayeredConfig::with_defaults()
            .load_from_file(&path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?,
        None => LayeredConfig::with_defaults(),
    };

    Ok(config.load_from_env())
}

/// Layered configuration with CLI overrides applied last
pub fn load_with_overrides(config_path: Option<&Path>, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let mut config = load_layered(config_path)?;
    config.update_from_cli(overrides);
    Ok(config)
}
