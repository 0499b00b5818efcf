//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject addresses that are not `host:port`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{AppConfig, CacheConfig, QueueConfig, ServiceConfig};
use crate::observability::logging::LogLevel;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: invalid address {value:?} (expected host:port)")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: unknown log level {value:?}")]
    UnknownLevel { field: &'static str, value: String },

    #[error("logging: stdout is disabled and no file is set")]
    NoLogOutput,
}

/// Validate a full application config, collecting every problem.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_service(&config.service, &mut errors);

    if LogLevel::parse_strict(&config.logging.level).is_none() {
        errors.push(ValidationError::UnknownLevel {
            field: "logging.level",
            value: config.logging.level.clone(),
        });
    }

    if !config.logging.stdout && config.logging.file.is_none() {
        errors.push(ValidationError::NoLogOutput);
    }

    if config.observability.metrics_enabled
        && !is_host_port(&config.observability.metrics_address)
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    validate_cache(&config.cache, &mut errors);
    validate_queue(&config.queue, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the settings of a single service.
pub fn validate_service_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_service(config, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    if config.name.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "service.name" });
    }
    if !is_host_port(&config.address) {
        errors.push(ValidationError::InvalidAddress {
            field: "service.address",
            value: config.address.clone(),
        });
    }
    if config.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "service.shutdown_timeout_secs" });
    }
    if config.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "service.request_timeout_secs" });
    }
    if config.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "service.max_body_bytes" });
    }
}

fn validate_cache(config: &CacheConfig, errors: &mut Vec<ValidationError>) {
    if config.max_entries == 0 {
        errors.push(ValidationError::Zero { field: "cache.max_entries" });
    }
    if config.cleanup_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "cache.cleanup_interval_secs" });
    }
}

fn validate_queue(config: &QueueConfig, errors: &mut Vec<ValidationError>) {
    if config.max_size == 0 {
        errors.push(ValidationError::Zero { field: "queue.max_size" });
    }
    if config.batch_size == 0 {
        errors.push(ValidationError::Zero { field: "queue.batch_size" });
    }
    if config.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "queue.poll_interval_ms" });
    }
}

/// Accepts `host:port` and `[v6]:port` with a numeric port.
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let host = host.trim_start_matches('[').trim_end_matches(']');
            !host.is_empty() && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
