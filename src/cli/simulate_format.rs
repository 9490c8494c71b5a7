// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Formatting helpers for the simulate report.

use super::simulate::SimulationReport;

/// Print the report in human-readable format.
pub fn print_report_human(report: &SimulationReport) {
    print_header(report);
    print_cache(report);
    print_device(report);
}

fn print_header(report: &SimulationReport) {
    println!("====================================================");
    println!("  bocache simulation                     v{}", env!("CARGO_PKG_VERSION"));
    println!("====================================================");
    println!(
        "  Threads: {}  Iterations: {}  Elapsed: {}ms  ({:.0} ops/s)",
        report.threads, report.iterations, report.elapsed_ms, report.ops_per_sec
    );
    println!("====================================================");
}

fn print_cache(report: &SimulationReport) {
    let stats = &report.stats;
    println!("\nCache");
    println!(
        "  Hits: {}  Misses: {}  Hit rate: {}",
        stats.hits,
        stats.misses,
        format_percent(stats.hit_rate())
    );
    println!(
        "  Fresh: {}  Failed: {}  Stale discards: {}",
        stats.fresh_allocations, stats.allocation_failures, stats.stale_discards
    );
    println!(
        "  Purge passes: {} ({} destroyed)  Trim evictions: {}",
        stats.purge_passes, stats.purged, stats.trim_evictions
    );
    println!(
        "  Released: {} cached / {} destroyed  Dropped unreleased: {}",
        stats.released_to_cache, stats.released_destroyed, stats.orphans_reaped
    );
    println!(
        "  Cached: {} buffers, {} ({} reclaimable)",
        stats.cached_count,
        format_bytes(stats.cached_bytes),
        format_bytes(stats.reclaimable_bytes)
    );
    println!(
        "  Watermarks: high {}  low {}",
        format_bytes(report.high_watermark),
        format_bytes(report.low_watermark)
    );
}

fn print_device(report: &SimulationReport) {
    println!("\nDevice");
    println!(
        "  Creates: {}  Live before teardown: {}  Double destroys: {}",
        report.device_creates, report.device_live, report.double_destroys
    );
}

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}
