// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! CLI argument helpers and help text for bocache-cli.

use std::path::PathBuf;

/// Print general usage information.
pub fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "bocache-cli - GPU buffer-object cache toolkit v{}

USAGE:
    bocache-cli [COMMAND] [OPTIONS]

COMMANDS:
    simulate     Run a synthetic acquire/release workload on a mock device
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help       Show help for command
    -V, --version    Show version information
    --config FILE    Load cache configuration from a TOML file
    --log-json       Emit logs as JSON

EXAMPLES:
    bocache-cli simulate                         # Default workload
    bocache-cli simulate --threads 8 --json      # Machine-readable report
    bocache-cli config show --config cache.toml  # Effective configuration
    bocache-cli config validate                  # Check env overrides

ENVIRONMENT:
    BOCACHE_PAGE_SIZE        Allocation granularity in bytes
    BOCACHE_BUCKET_COUNT     Number of size classes
    BOCACHE_RETENTION_FLOOR  Entries kept in bucket 0 before trimming
    BOCACHE_HIGH_WATERMARK   Reclaimable bytes that trigger a purge
    BOCACHE_LOW_WATERMARK    Trim target in bytes
    BOCACHE_MAX_RECORDS      Cap on live buffer objects
    RUST_LOG                 Log level (trace, debug, info, warn, error)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
pub fn print_command_help(command: &str) {
    match command {
        "simulate" => print_simulate_help(),
        "config" => print_config_help(),
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'bocache-cli help' for general usage.",
                command
            );
        }
    }
}

fn print_simulate_help() {
    eprintln!(
        "bocache-cli simulate - Synthetic cache workload

USAGE:
    bocache-cli simulate [OPTIONS]

OPTIONS:
    --threads N          Worker threads (default: CPU count)
    --iterations N       Acquires per worker (default: 10000)
    --max-size BYTES     Largest request (default: 1048576)
    --hold N             Buffers each worker keeps (default: 16)
    --gpu-ratio R        Share of GPU-target requests, 0..1 (default: 0.5)
    --busy-ratio R       Chance a buffer is left busy, 0..1 (default: 0.1)
    --reclaim-ratio R    Chance per step of device reclaim, 0..1 (default: 0.001)
    --aperture-mb N      Mock aperture size (default: 64)
    --seed N             RNG seed
    --config FILE        Cache configuration file
    --json               Output in JSON format
"
    );
}

fn print_config_help() {
    eprintln!(
        "bocache-cli config - Inspect configuration

USAGE:
    bocache-cli config <SUBCOMMAND> [--config FILE]

SUBCOMMANDS:
    show       Print the effective configuration (file + environment)
    defaults   Print the built-in defaults
    validate   Exit 0 if the configuration is valid, 2 otherwise
"
    );
}

/// Remove `flag` from `args`. Returns whether it was present.
pub fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

/// Remove `flag VALUE` from `args` and return the value.
pub fn take_option(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, String> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(format!("Missing value for {}", flag));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

pub fn take_config_path(args: &mut Vec<String>) -> Result<Option<PathBuf>, String> {
    Ok(take_option(args, "--config")?.map(PathBuf::from))
}
