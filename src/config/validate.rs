// src/config/validate.rs

use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ClusterExecError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ClusterExecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.paths, raw.recap, raw.ledger))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_paths(cfg)?;
    validate_recap(cfg)?;
    validate_ledger(cfg)?;
    Ok(())
}

fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    if cfg.paths.data_dir.as_os_str().is_empty() {
        return Err(ClusterExecError::ConfigError(
            "[paths].data_dir must not be empty".to_string(),
        ));
    }
    if let Some(lock_dir) = &cfg.paths.lock_dir {
        if lock_dir.as_os_str().is_empty() {
            return Err(ClusterExecError::ConfigError(
                "[paths].lock_dir must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_recap(cfg: &RawConfigFile) -> Result<()> {
    let banner = &cfg.recap.banner;
    if banner.trim().is_empty() {
        return Err(ClusterExecError::ConfigError(
            "[recap].banner must not be empty".to_string(),
        ));
    }
    if banner.contains('\n') {
        return Err(ClusterExecError::ConfigError(
            "[recap].banner must be a single line".to_string(),
        ));
    }
    Ok(())
}

fn validate_ledger(cfg: &RawConfigFile) -> Result<()> {
    let name = &cfg.ledger.file_name;
    let is_bare_name = Path::new(name)
        .file_name()
        .is_some_and(|file_name| file_name == name.as_str());
    if !is_bare_name {
        return Err(ClusterExecError::ConfigError(format!(
            "[ledger].file_name must be a plain file name (got '{}')",
            name
        )));
    }
    Ok(())
}
