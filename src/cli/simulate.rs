// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Synthetic acquire/release workload against the mock device.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::bo::BufferObject;
use crate::cache::{CacheManager, CacheStats, Target};
use crate::config::CacheConfig;
use crate::device::MockDevice;
use crate::error::BoError;

/// Knobs for one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateOptions {
    pub threads: usize,
    pub iterations: usize,
    /// Largest request in bytes.
    pub max_size: u64,
    /// Buffers each worker keeps before releasing one.
    pub hold: usize,
    /// Share of requests made for GPU rendering.
    pub gpu_ratio: f64,
    /// Chance per iteration that a held buffer is marked busy on the device.
    pub busy_ratio: f64,
    /// Chance per iteration that the device reclaims every purgeable buffer.
    pub reclaim_ratio: f64,
    pub aperture: u64,
    pub seed: u64,
    pub json: bool,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            iterations: 10_000,
            max_size: 1 << 20,
            hold: 16,
            gpu_ratio: 0.5,
            busy_ratio: 0.1,
            reclaim_ratio: 0.001,
            aperture: 64 << 20,
            seed: 0x5eed,
            json: false,
        }
    }
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub threads: usize,
    pub iterations: usize,
    pub elapsed_ms: u64,
    pub ops_per_sec: f64,
    pub failed_acquires: u64,
    pub stats: CacheStats,
    pub high_watermark: u64,
    pub low_watermark: u64,
    pub device_creates: u64,
    /// Device handles alive after every worker released its buffers.
    pub device_live: usize,
    pub double_destroys: usize,
}

/// Parse `simulate` flags starting at `args[start]`.
pub fn parse_args(args: &[String], start: usize) -> Result<SimulateOptions, String> {
    let mut opts = SimulateOptions::default();
    let mut i = start;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--json" {
            opts.json = true;
            i += 1;
            continue;
        }
        let value = args
            .get(i + 1)
            .ok_or_else(|| format!("Missing value for {}", flag))?;
        match flag {
            "--threads" => opts.threads = parse_value(flag, value)?,
            "--iterations" => opts.iterations = parse_value(flag, value)?,
            "--max-size" => opts.max_size = parse_value(flag, value)?,
            "--hold" => opts.hold = parse_value(flag, value)?,
            "--gpu-ratio" => opts.gpu_ratio = parse_ratio(flag, value)?,
            "--busy-ratio" => opts.busy_ratio = parse_ratio(flag, value)?,
            "--reclaim-ratio" => opts.reclaim_ratio = parse_ratio(flag, value)?,
            "--aperture-mb" => {
                opts.aperture = parse_value::<u64>(flag, value)?
                    .checked_mul(1 << 20)
                    .ok_or_else(|| format!("{} is too large: {}", flag, value))?
            }
            "--seed" => opts.seed = parse_value(flag, value)?,
            _ => return Err(format!("Unknown argument: {}", flag)),
        }
        i += 2;
    }
    if opts.threads == 0 {
        return Err("--threads must be at least 1".to_string());
    }
    Ok(opts)
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

fn parse_ratio(flag: &str, value: &str) -> Result<f64, String> {
    let ratio: f64 = parse_value(flag, value)?;
    if !(0.0..=1.0).contains(&ratio) {
        return Err(format!("{} must be between 0 and 1", flag));
    }
    Ok(ratio)
}

/// Run the workload and tear the cache down afterwards.
pub fn run_simulation(
    opts: &SimulateOptions,
    config: CacheConfig,
) -> Result<SimulationReport, BoError> {
    let device = Arc::new(MockDevice::new(opts.aperture));
    let cache = Arc::new(CacheManager::new(Arc::clone(&device), config)?);
    let (high_watermark, low_watermark) = cache.watermarks();

    tracing::info!(
        threads = opts.threads,
        iterations = opts.iterations,
        max_size = opts.max_size,
        "starting simulation"
    );
    let started = Instant::now();

    let workers: Vec<_> = (0..opts.threads)
        .map(|worker| {
            let device = Arc::clone(&device);
            let cache = Arc::clone(&cache);
            let opts = opts.clone();
            std::thread::spawn(move || run_worker(worker as u64, &opts, &device, &cache))
        })
        .collect();

    let mut failed_acquires = 0;
    for worker in workers {
        match worker.join() {
            Ok(failed) => failed_acquires += failed,
            Err(_) => tracing::error!("simulation worker panicked"),
        }
    }

    let elapsed = started.elapsed();
    let stats = cache.stats();
    let total_ops = (opts.threads * opts.iterations) as f64;
    let report = SimulationReport {
        threads: opts.threads,
        iterations: opts.iterations,
        elapsed_ms: elapsed.as_millis() as u64,
        ops_per_sec: total_ops / elapsed.as_secs_f64().max(f64::EPSILON),
        failed_acquires,
        stats,
        high_watermark,
        low_watermark,
        device_creates: device.created_count(),
        device_live: device.live_count(),
        double_destroys: device.double_destroys().len(),
    };

    cache.shutdown();
    Ok(report)
}

/// One worker's loop. Returns the number of failed acquires.
fn run_worker(
    worker: u64,
    opts: &SimulateOptions,
    device: &MockDevice,
    cache: &CacheManager<MockDevice>,
) -> u64 {
    let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(worker));
    let mut held: Vec<BufferObject> = Vec::with_capacity(opts.hold + 1);
    let mut failed = 0;

    for _ in 0..opts.iterations {
        let size = rng.gen_range(1..=opts.max_size.max(1));
        let target = if rng.gen_bool(opts.gpu_ratio) {
            Target::Gpu
        } else {
            Target::Cpu
        };

        match cache.acquire(size, target) {
            Ok(bo) => {
                if rng.gen_bool(opts.busy_ratio) {
                    device.set_busy(bo.handle(), true);
                }
                held.push(bo);
            }
            Err(err) => {
                tracing::debug!(error = %err, size, "simulated acquire failed");
                failed += 1;
            }
        }

        if held.len() > opts.hold {
            let victim = held.swap_remove(rng.gen_range(0..held.len()));
            if rng.gen_bool(0.5) {
                device.set_busy(victim.handle(), false);
            }
            cache.release(victim);
        }

        if rng.gen_bool(opts.reclaim_ratio) {
            device.reclaim_all();
        }
    }

    for bo in held.drain(..) {
        cache.release(bo);
    }
    failed
}

#[cfg(test)]
#[path = "simulate_tests.rs"]
mod tests;
