//! Tests for acquire/release policy, eviction and teardown.

use std::sync::Arc;

use super::*;
use crate::config::CacheConfig;
use crate::device::{BoDevice, DeviceError, GemHandle, MockDevice};
use crate::error::BoError;

fn manager_with(config: CacheConfig) -> (Arc<MockDevice>, CacheManager<MockDevice>) {
    let device = Arc::new(MockDevice::default());
    let manager = CacheManager::new(Arc::clone(&device), config).unwrap();
    (device, manager)
}

fn manager() -> (Arc<MockDevice>, CacheManager<MockDevice>) {
    manager_with(CacheConfig::default())
}

fn tight_budget() -> CacheConfig {
    CacheConfig {
        retention_floor: 0,
        high_watermark: Some(8192),
        low_watermark: Some(4096),
        ..CacheConfig::default()
    }
}

#[test]
fn test_default_watermarks_follow_aperture() {
    let (device, manager) = manager();
    let total = device.aperture().unwrap().total;
    assert_eq!(manager.watermarks(), (total / 2, total / 4));
    assert_eq!(manager.bucket_count(), 12);
    assert_eq!(manager.min_entries(0), 64);
    assert_eq!(manager.min_entries(7), 0);
}

#[test]
fn test_gpu_reuse_is_lifo() {
    let (_device, manager) = manager();
    let a = manager.acquire(4096, Target::Gpu).unwrap();
    let b = manager.acquire(4096, Target::Gpu).unwrap();
    let (ha, hb) = (a.handle(), b.handle());
    manager.release(a);
    manager.release(b);
    assert_eq!(manager.bucket_handles(0), vec![ha, hb]);

    let reused = manager.acquire(100, Target::Gpu).unwrap();
    assert_eq!(reused.handle(), hb);
    assert_eq!(manager.bucket_handles(0), vec![ha]);
    assert_eq!(manager.stats().hits, 1);
    manager.release(reused);
}

#[test]
fn test_gpu_falls_through_to_larger_bucket() {
    let (_device, manager) = manager();
    let big = manager.acquire(16384, Target::Gpu).unwrap();
    let handle = big.handle();
    manager.release(big);

    let reused = manager.acquire(4096, Target::Gpu).unwrap();
    assert_eq!(reused.handle(), handle);
    assert_eq!(reused.size(), 16384);
    manager.release(reused);
}

#[test]
fn test_cpu_skips_busy_buffer() {
    let (device, manager) = manager();
    let bo = manager.acquire(4096, Target::Cpu).unwrap();
    let cached = bo.handle();
    manager.release(bo);
    device.set_busy(cached, true);

    let fresh = manager.acquire(4096, Target::Cpu).unwrap();
    assert_ne!(fresh.handle(), cached);
    assert_eq!(manager.bucket_handles(0), vec![cached]);
    let stats = manager.stats();
    assert_eq!((stats.hits, stats.misses), (0, 2));
    manager.release(fresh);
}

#[test]
fn test_cpu_stays_in_exact_bucket() {
    let (_device, manager) = manager();
    let bo = manager.acquire(8192, Target::Gpu).unwrap();
    let cached = bo.handle();
    manager.release(bo);

    let fresh = manager.acquire(4096, Target::Cpu).unwrap();
    assert_ne!(fresh.handle(), cached);
    assert_eq!(manager.bucket_len(1), 1);
    manager.release(fresh);
}

#[test]
fn test_cpu_discards_reclaimed_and_retries() {
    let (device, manager) = manager();
    let a = manager.acquire(4096, Target::Cpu).unwrap();
    let b = manager.acquire(4096, Target::Cpu).unwrap();
    let (ha, hb) = (a.handle(), b.handle());
    manager.release(a);
    manager.release(b);
    device.reclaim(hb);

    let reused = manager.acquire(4096, Target::Cpu).unwrap();
    assert_eq!(reused.handle(), ha);
    assert_eq!(device.destroy_count(hb), 1);
    assert_eq!(manager.stats().stale_discards, 1);
    manager.release(reused);
}

#[test]
fn test_release_destroys_uncacheable_sizes() {
    let (device, manager) = manager();
    let huge = manager.bucket_size(11) + 1;
    let bo = manager.acquire(huge, Target::Gpu).unwrap();
    assert_eq!(bo.size(), huge);
    let handle = bo.handle();
    manager.release(bo);

    assert_eq!(device.destroy_count(handle), 1);
    assert_eq!(manager.stats().released_destroyed, 1);
    assert_eq!(manager.stats().cached_count, 0);
}

#[test]
fn test_release_destroys_reclaimed_buffer() {
    let (device, manager) = manager();
    device.set_reclaim_on_dontneed(true);
    let bo = manager.acquire(4096, Target::Gpu).unwrap();
    let handle = bo.handle();
    manager.release(bo);
    assert_eq!(device.destroy_count(handle), 1);
    assert_eq!(manager.bucket_len(0), 0);
}

#[test]
fn test_release_unmaps_mapped_buffer() {
    let (device, manager) = manager();
    let mut bo = manager.acquire(4096, Target::Cpu).unwrap();
    bo.map(&*device).unwrap();
    manager.release(bo);
    assert_eq!(device.call_counts().unmaps, 1);
    assert_eq!(manager.bucket_len(0), 1);
}

#[test]
fn test_exported_buffer_never_cached() {
    let (device, manager) = manager();
    let mut bo = manager.acquire(4096, Target::Gpu).unwrap();
    let name = bo.flink(&*device).unwrap();
    assert_ne!(name, 0);

    let imported = manager.create_for_name(name).unwrap();
    assert_eq!(imported.name(), name);
    assert_eq!(imported.size(), 4096);
    assert_ne!(imported.handle(), bo.handle());

    let (ha, hb) = (bo.handle(), imported.handle());
    manager.release(imported);
    manager.release(bo);
    assert_eq!(manager.bucket_len(0), 0);
    assert_eq!(device.destroy_count(ha), 1);
    assert_eq!(device.destroy_count(hb), 1);
    assert_eq!(manager.stats().imported, 1);
}

#[test]
fn test_create_for_unknown_name_fails() {
    let (_device, manager) = manager();
    assert!(matches!(
        manager.create_for_name(999),
        Err(BoError::Device(DeviceError::NoSuchName(999)))
    ));
    assert_eq!(manager.stats().live_records, 0);
}

#[test]
fn test_purge_destroys_reclaimed_entries() {
    let (device, manager) = manager_with(tight_budget());
    let held: Vec<_> = (0..3)
        .map(|_| manager.acquire(4096, Target::Gpu).unwrap())
        .collect();
    for bo in held {
        manager.release(bo);
    }
    assert_eq!(manager.total_cached_bytes(), 3 * 4096);
    device.reclaim_all();

    let bo = manager.acquire(8192, Target::Gpu).unwrap();
    let stats = manager.stats();
    assert_eq!(stats.purge_passes, 1);
    assert_eq!(stats.purged, 3);
    assert_eq!(stats.trim_evictions, 0);
    assert_eq!(manager.total_cached_bytes(), 0);
    manager.release(bo);
}

#[test]
fn test_trim_evicts_newest_down_to_low_watermark() {
    let (device, manager) = manager_with(tight_budget());
    let held: Vec<_> = (0..3)
        .map(|_| manager.acquire(4096, Target::Gpu).unwrap())
        .collect();
    let oldest = held[0].handle();
    for bo in held {
        manager.release(bo);
    }

    let bo = manager.acquire(8192, Target::Gpu).unwrap();
    assert_eq!(manager.stats().trim_evictions, 2);
    assert_eq!(manager.total_cached_bytes(), 4096);
    assert_eq!(manager.bucket_handles(0), vec![oldest]);
    assert!(device.double_destroys().is_empty());
    manager.release(bo);
}

#[test]
fn test_trim_respects_retention_floor() {
    let config = CacheConfig {
        retention_floor: 2,
        high_watermark: Some(0),
        low_watermark: Some(0),
        ..CacheConfig::default()
    };
    let (_device, manager) = manager_with(config);
    let held: Vec<_> = (0..3)
        .map(|_| manager.acquire(4096, Target::Gpu).unwrap())
        .collect();
    for bo in held {
        manager.release(bo);
    }
    assert_eq!(manager.total_cached_bytes(), 4096);

    let bo = manager.acquire(8192, Target::Gpu).unwrap();
    assert_eq!(manager.bucket_len(0), 2);
    assert_eq!(manager.total_cached_bytes(), 0);
    manager.release(bo);
}

#[test]
fn test_trim_stops_mid_pass_at_low_watermark() {
    let config = CacheConfig {
        retention_floor: 0,
        high_watermark: Some(20_000),
        low_watermark: Some(12_000),
        ..CacheConfig::default()
    };
    let (_device, manager) = manager_with(config);
    let held: Vec<_> = [4096, 4096, 8192, 16384]
        .iter()
        .map(|&size| manager.acquire(size, Target::Cpu).unwrap())
        .collect();
    for bo in held {
        manager.release(bo);
    }
    assert_eq!(manager.total_cached_bytes(), 32768);

    let bo = manager.acquire(32768, Target::Gpu).unwrap();
    assert_eq!(manager.stats().trim_evictions, 2);
    assert_eq!(manager.bucket_len(2), 0);
    assert_eq!(manager.bucket_len(1), 0);
    assert_eq!(manager.bucket_len(0), 2);
    assert_eq!(manager.total_cached_bytes(), 8192);
    manager.release(bo);
}

#[test]
fn test_allocation_failure_returns_record() {
    let (device, manager) = manager();
    device.fail_next_creates(1);
    assert!(matches!(
        manager.acquire(5000, Target::Cpu),
        Err(BoError::OutOfMemory { size: 8192 })
    ));
    let stats = manager.stats();
    assert_eq!(stats.allocation_failures, 1);
    assert_eq!(stats.live_records, 0);

    let bo = manager.acquire(5000, Target::Cpu).unwrap();
    assert_eq!(bo.size(), 8192);
    manager.release(bo);
}

#[test]
fn test_record_limit_bounds_live_buffers() {
    let config = CacheConfig {
        max_records: Some(1),
        ..CacheConfig::default()
    };
    let (_device, manager) = manager_with(config);
    let bo = manager.acquire(4096, Target::Gpu).unwrap();
    assert!(matches!(
        manager.acquire(4096, Target::Gpu),
        Err(BoError::OutOfMemory { .. })
    ));
    manager.release(bo);
    let again = manager.acquire(4096, Target::Gpu).unwrap();
    assert_eq!(manager.stats().hits, 1);
    manager.release(again);
}

#[test]
fn test_shutdown_destroys_cache_and_later_releases() {
    let (device, manager) = manager();
    let cached = manager.acquire(4096, Target::Gpu).unwrap();
    let held = manager.acquire(4096, Target::Gpu).unwrap();
    manager.release(cached);

    manager.shutdown();
    assert_eq!(manager.stats().cached_count, 0);
    assert_eq!(device.live_count(), 1);

    manager.release(held);
    assert_eq!(device.live_count(), 0);
    assert!(device.double_destroys().is_empty());
}

#[test]
fn test_drop_tears_down() {
    let (device, manager) = manager();
    let bo = manager.acquire(4096, Target::Gpu).unwrap();
    manager.release(bo);
    assert_eq!(device.live_count(), 1);
    drop(manager);
    assert_eq!(device.live_count(), 0);
    assert_eq!(device.live_handles(), Vec::<GemHandle>::new());
}

#[test]
fn test_aperture_failure_fails_init() {
    let device = Arc::new(MockDevice::default());
    device.set_fail_aperture(true);
    assert!(matches!(
        CacheManager::new(device, CacheConfig::default()),
        Err(BoError::Device(DeviceError::Ioctl { .. }))
    ));
}

#[test]
fn test_dropped_buffer_destroyed_at_teardown() {
    let (device, manager) = manager();
    let bo = manager.acquire(4096, Target::Gpu).unwrap();
    let handle = bo.handle();
    drop(bo);
    drop(manager);
    assert_eq!(device.live_count(), 0);
    assert_eq!(device.destroy_count(handle), 1);
}

#[test]
fn test_dropped_buffer_reaped_on_next_acquire() {
    let (device, manager) = manager();
    let mut bo = manager.acquire(8192, Target::Cpu).unwrap();
    let handle = bo.handle();
    bo.map(&*device).unwrap();
    drop(bo);
    assert_eq!(device.live_count(), 1);

    let next = manager.acquire(4096, Target::Cpu).unwrap();
    let stats = manager.stats();
    assert_eq!(stats.orphans_reaped, 1);
    assert_eq!(stats.live_records, 1);
    assert_eq!(device.destroy_count(handle), 1);
    assert_eq!(device.mapping_count(handle), 0);
    assert_eq!(manager.bucket_len(1), 0);
    manager.release(next);
    assert!(device.double_destroys().is_empty());
}

#[test]
fn test_buffer_dropped_after_manager_is_left_alone() {
    let (device, manager) = manager();
    let bo = manager.acquire(4096, Target::Gpu).unwrap();
    drop(manager);
    drop(bo);
    assert_eq!(device.live_count(), 1);
    assert!(device.double_destroys().is_empty());
}
