// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TriggerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TriggerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.paths, raw.engine, raw.audit))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_paths(cfg)?;
    validate_engine(cfg)?;
    validate_audit(cfg)?;
    Ok(())
}

fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    let paths = &cfg.paths;
    if paths.workspace_home.as_os_str().is_empty() {
        return Err(TriggerError::ConfigError(
            "[paths].workspace_home must not be empty".to_string(),
        ));
    }
    if paths.data_root.as_os_str().is_empty() {
        return Err(TriggerError::ConfigError(
            "[paths].data_root must not be empty".to_string(),
        ));
    }
    if paths.workspace_home == paths.data_root {
        return Err(TriggerError::ConfigError(format!(
            "[paths].workspace_home and [paths].data_root must differ (both {:?})",
            paths.data_root
        )));
    }
    let name = paths.rule_file_name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(TriggerError::ConfigError(format!(
            "[paths].rule_file_name must be a plain file name (got {:?})",
            paths.rule_file_name
        )));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    let engine = &cfg.engine;
    if engine.max_workers == 0 {
        return Err(TriggerError::ConfigError(
            "[engine].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.queue_length == 0 {
        return Err(TriggerError::ConfigError(
            "[engine].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.miss_cache_expire_size == 0 {
        return Err(TriggerError::ConfigError(
            "[engine].miss_cache_expire_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if !engine.miss_cache_ttl_secs.is_finite() || engine.miss_cache_ttl_secs < 0.0 {
        return Err(TriggerError::ConfigError(format!(
            "[engine].miss_cache_ttl_secs must be a non-negative number (got {})",
            engine.miss_cache_ttl_secs
        )));
    }
    if !engine.atime_slack_secs.is_finite() || engine.atime_slack_secs < 0.0 {
        return Err(TriggerError::ConfigError(format!(
            "[engine].atime_slack_secs must be a non-negative number (got {})",
            engine.atime_slack_secs
        )));
    }
    if engine.activation_poll_secs == 0 {
        return Err(TriggerError::ConfigError(
            "[engine].activation_poll_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_audit(cfg: &RawConfigFile) -> Result<()> {
    if cfg.audit.max_bytes == 0 {
        return Err(TriggerError::ConfigError(
            "[audit].max_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
