//! Configuration validation.
//!
//! Validates every key a sync run reads before any upstream call is made.

use crate::domain::error::SyncError;
use crate::domain::instrument::parse_markets;
use crate::ports::config_port::ConfigPort;

pub fn validate_upstream_config(config: &dyn ConfigPort) -> Result<(), SyncError> {
    validate_base_url(config)?;
    validate_access_token(config)?;
    validate_timeout(config)?;
    validate_min_interval(config)?;
    Ok(())
}

pub fn validate_sync_config(config: &dyn ConfigPort) -> Result<(), SyncError> {
    validate_target_days(config)?;
    validate_safety_buffer(config)?;
    validate_commit_every(config)?;
    validate_markets(config)?;
    Ok(())
}

pub fn validate_store_config(config: &dyn ConfigPort) -> Result<(), SyncError> {
    match config.get_string("store", "backend").as_deref().map(str::trim) {
        None | Some("sqlite") | Some("postgres") => Ok(()),
        Some(other) => Err(invalid(
            "store",
            "backend",
            format!("unknown backend '{other}', expected sqlite or postgres"),
        )),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SyncError {
    SyncError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SyncError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(SyncError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_base_url(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let url = require(config, "upstream", "base_url")?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(invalid(
            "upstream",
            "base_url",
            "base_url must start with http:// or https://",
        ));
    }
    Ok(())
}

fn validate_access_token(config: &dyn ConfigPort) -> Result<(), SyncError> {
    require(config, "upstream", "access_token").map(|_| ())
}

fn validate_timeout(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if config.get_int("upstream", "timeout_secs", 30) <= 0 {
        return Err(invalid(
            "upstream",
            "timeout_secs",
            "timeout_secs must be positive",
        ));
    }
    Ok(())
}

fn validate_min_interval(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if config.get_int("upstream", "min_interval_ms", 50) < 0 {
        return Err(invalid(
            "upstream",
            "min_interval_ms",
            "min_interval_ms must be non-negative",
        ));
    }
    Ok(())
}

fn validate_target_days(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let value = config.get_int("sync", "target_days", 1095);
    if value <= 0 || value > i64::from(u32::MAX) {
        return Err(invalid("sync", "target_days", "target_days must be positive"));
    }
    Ok(())
}

fn validate_safety_buffer(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let value = config.get_int("sync", "safety_buffer_days", 10);
    if value < 0 || value > i64::from(u32::MAX) {
        return Err(invalid(
            "sync",
            "safety_buffer_days",
            "safety_buffer_days must be non-negative",
        ));
    }
    Ok(())
}

fn validate_commit_every(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if config.get_int("sync", "commit_every", 10) <= 0 {
        return Err(invalid("sync", "commit_every", "commit_every must be positive"));
    }
    Ok(())
}

fn validate_markets(config: &dyn ConfigPort) -> Result<(), SyncError> {
    match config.get_string("sync", "markets") {
        Some(markets) => parse_markets(&markets)
            .map(|_| ())
            .map_err(|e| invalid("sync", "markets", e.to_string())),
        None => Ok(()),
    }
}
