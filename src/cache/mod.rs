//! Cache facade.
//!
//! # Data Flow
//! ```text
//! caller key
//!     → prefix applied ("prefix:key")
//!     → Cache backend (memory.rs today; remote stores plug in behind the trait)
//! ```
//!
//! # Design Decisions
//! - A zero TTL means "use the configured default"
//! - Multi-key reads skip missing keys instead of failing
//! - Operations return `Result` so remote backends fit the same trait

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::config::CacheConfig;

pub mod memory;

pub use memory::MemoryCache;

/// Errors returned by cache operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key not found: {0}")]
    NotFound(String),

    #[error("invalid cache options: {0}")]
    InvalidOptions(String),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Cache tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// TTL used when `set` is called with `Duration::ZERO`. Zero means no expiry.
    pub default_ttl: Duration,
    /// Interval between sweeps of expired entries.
    pub cleanup_interval: Duration,
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Prefix added to every key.
    pub key_prefix: String,
}

impl CacheOptions {
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidOptions("max entries must be > 0".into()));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CacheError::InvalidOptions("cleanup interval must be > 0".into()));
        }
        Ok(())
    }

    /// Apply the key prefix.
    pub fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
            max_entries: config.max_entries,
            key_prefix: config.key_prefix.clone(),
        }
    }
}

/// Key/value cache with per-entry expiry.
pub trait Cache<V>: Send + Sync {
    fn get(&self, key: &str) -> Result<V, CacheError>;

    /// Store `value`; a zero `ttl` uses the default TTL.
    fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn clear(&self) -> Result<(), CacheError>;

    /// Backend name, for logs.
    fn kind(&self) -> &'static str;

    /// Values for every key present; missing keys are skipped.
    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, V>, CacheError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            match self.get(key) {
                Ok(value) => {
                    found.insert(key.to_string(), value);
                }
                Err(CacheError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    fn set_multi(&self, items: HashMap<String, V>, ttl: Duration) -> Result<(), CacheError> {
        for (key, value) in items {
            self.set(&key, value, ttl)?;
        }
        Ok(())
    }

    fn delete_multi(&self, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }
}
