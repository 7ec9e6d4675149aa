//! Configuration validation

use crate::Config;
use panel_core::{Error, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_tls(config)?;
    validate_logging(config)?;

    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    if config.server.static_path.as_os_str().is_empty() {
        return Err(Error::Config("static_path cannot be empty".to_string()));
    }

    if !config.server.static_path.is_dir() {
        tracing::warn!(
            static_path = %config.server.static_path.display(),
            "Static asset directory does not exist"
        );
    }

    if config.server.shutdown_timeout.as_secs() > 300 {
        tracing::warn!("shutdown_timeout is very high (>5 minutes)");
    }

    Ok(())
}

fn validate_tls(config: &Config) -> Result<()> {
    let Some(ref tls) = config.tls else {
        return Ok(());
    };

    if tls.cert_file.is_empty() {
        return Err(Error::Config("TLS cert_file cannot be empty".to_string()));
    }
    if tls.key_file.is_empty() {
        return Err(Error::Config("TLS key_file cannot be empty".to_string()));
    }

    match tls.min_tls_version.as_str() {
        "1.2" | "1.3" => {}
        _ => {
            return Err(Error::Config(format!(
                "Invalid TLS version: {} (must be 1.2 or 1.3)",
                tls.min_tls_version
            )));
        }
    }

    if tls.reload_interval.is_zero() {
        return Err(Error::Config("TLS reload_interval must be > 0".to_string()));
    }

    if tls.reload_debounce.is_zero() {
        return Err(Error::Config("TLS reload_debounce must be > 0".to_string()));
    }

    if tls.reload_debounce >= tls.reload_interval {
        tracing::warn!(
            debounce_ms = tls.reload_debounce.as_millis(),
            interval_ms = tls.reload_interval.as_millis(),
            "TLS reload_debounce is not shorter than reload_interval"
        );
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(Error::Config(format!(
            "Invalid log level: {} (must be one of {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        )));
    }

    match config.logging.format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Error::Config(format!(
            "Invalid log format: {other} (must be text or json)"
        ))),
    }
}
