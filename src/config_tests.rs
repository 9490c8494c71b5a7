//! Tests for cache configuration.

use super::*;
use std::collections::HashMap;
use std::io::Write;

#[test]
fn test_defaults_are_valid() {
    let config = CacheConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.page_size, 4096);
    assert_eq!(config.bucket_count, 12);
    assert_eq!(config.retention_floor, 64);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = CacheConfig::from_toml_str("bucket_count = 8\nhigh_watermark = 1048576\n").unwrap();
    assert_eq!(config.bucket_count, 8);
    assert_eq!(config.high_watermark, Some(1 << 20));
    assert_eq!(config.page_size, 4096);
}

#[test]
fn test_rejects_bad_page_size() {
    let err = CacheConfig::from_toml_str("page_size = 3000").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_rejects_inverted_watermarks() {
    let err = CacheConfig::from_toml_str("high_watermark = 10\nlow_watermark = 20").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_rejects_overflowing_buckets() {
    let config = CacheConfig {
        page_size: 1 << 40,
        bucket_count: 30,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_env_overrides() {
    let env: HashMap<&str, &str> = [
        ("BOCACHE_BUCKET_COUNT", "6"),
        ("BOCACHE_LOW_WATERMARK", " 4096 "),
    ]
    .into_iter()
    .collect();
    let mut config = CacheConfig::default();
    config
        .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();
    assert_eq!(config.bucket_count, 6);
    assert_eq!(config.low_watermark, Some(4096));
}

#[test]
fn test_env_override_parse_error() {
    let mut config = CacheConfig::default();
    let result = config.apply_env_overrides(|key| {
        (key == "BOCACHE_RETENTION_FLOOR").then(|| "lots".to_string())
    });
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "retention_floor = 16\nmax_records = 128").unwrap();
    let config = CacheConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.retention_floor, 16);
    assert_eq!(config.max_records, Some(128));
}

#[test]
fn test_watermarks_default_from_aperture() {
    let config = CacheConfig::default();
    assert_eq!(config.watermarks(1 << 30), (1 << 29, 1 << 28));

    let pinned = CacheConfig {
        high_watermark: Some(100),
        ..Default::default()
    };
    assert_eq!(pinned.watermarks(1 << 30), (100, 100));
}
