// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Cache configuration: TOML file, environment overrides, validation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of size-class buckets.
pub const MAX_BUCKETS: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the buffer-object cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Allocation granularity in bytes. Must be a power of two.
    pub page_size: u64,
    /// Number of power-of-two size classes, starting at one page.
    pub bucket_count: usize,
    /// Retention floor of bucket 0; bucket `i` keeps `retention_floor >> i`.
    pub retention_floor: usize,
    /// Reclaimable bytes above which a cache miss purges. Defaults to half
    /// the device aperture.
    pub high_watermark: Option<u64>,
    /// Target for the trim pass. Defaults to a quarter of the aperture.
    pub low_watermark: Option<u64>,
    /// Cap on live buffer-object records.
    pub max_records: Option<usize>,
    /// Released records kept for reuse.
    pub max_free_records: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            bucket_count: 12,
            retention_floor: 64,
            high_watermark: None,
            low_watermark: None,
            max_records: None,
            max_free_records: 256,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => CacheConfig::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BOCACHE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BOCACHE_PAGE_SIZE") {
            self.page_size = parse_env("BOCACHE_PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("BOCACHE_BUCKET_COUNT") {
            self.bucket_count = parse_env("BOCACHE_BUCKET_COUNT", &v)?;
        }
        if let Some(v) = lookup("BOCACHE_RETENTION_FLOOR") {
            self.retention_floor = parse_env("BOCACHE_RETENTION_FLOOR", &v)?;
        }
        if let Some(v) = lookup("BOCACHE_HIGH_WATERMARK") {
            self.high_watermark = Some(parse_env("BOCACHE_HIGH_WATERMARK", &v)?);
        }
        if let Some(v) = lookup("BOCACHE_LOW_WATERMARK") {
            self.low_watermark = Some(parse_env("BOCACHE_LOW_WATERMARK", &v)?);
        }
        if let Some(v) = lookup("BOCACHE_MAX_RECORDS") {
            self.max_records = Some(parse_env("BOCACHE_MAX_RECORDS", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.page_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "page_size {} is not a power of two",
                self.page_size
            )));
        }
        if self.bucket_count == 0 || self.bucket_count > MAX_BUCKETS {
            return Err(ConfigError::Invalid(format!(
                "bucket_count {} outside 1..={}",
                self.bucket_count, MAX_BUCKETS
            )));
        }
        if self.page_size.trailing_zeros() as usize + self.bucket_count - 1 >= 63 {
            return Err(ConfigError::Invalid(
                "largest bucket size overflows".to_string(),
            ));
        }
        if let (Some(high), Some(low)) = (self.high_watermark, self.low_watermark) {
            if low > high {
                return Err(ConfigError::Invalid(format!(
                    "low_watermark {} exceeds high_watermark {}",
                    low, high
                )));
            }
        }
        Ok(())
    }

    /// Resolve watermarks against the device aperture.
    pub fn watermarks(&self, aperture_total: u64) -> (u64, u64) {
        let high = self.high_watermark.unwrap_or(aperture_total / 2);
        let low = self.low_watermark.unwrap_or(aperture_total / 4).min(high);
        (high, low)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}={:?} is not a number", key, value)))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
