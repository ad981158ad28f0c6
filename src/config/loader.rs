// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if given; otherwise load the default path if it exists, or
/// fall back to built-in defaults.
///
/// An explicitly given path that does not exist is an error.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => load_and_validate(path),
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                load_and_validate(&default_path)
            } else {
                debug!(path = ?default_path, "no config file found; using defaults");
                Ok(ConfigFile::default())
            }
        }
    }
}

/// `ClusterExec.toml`, or the path in `CLUSTER_EXEC_CONFIG` when set.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("CLUSTER_EXEC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ClusterExec.toml"))
}
