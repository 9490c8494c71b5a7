// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! `config` subcommands: show the effective config, print defaults, validate.

use std::path::Path;

use crate::config::CacheConfig;

/// Print the effective configuration as TOML. Returns the exit code.
pub fn run_show(path: Option<&Path>) -> i32 {
    match CacheConfig::load(path) {
        Ok(config) => print_toml(&config),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            2
        }
    }
}

pub fn run_defaults() -> i32 {
    print_toml(&CacheConfig::default())
}

/// Load and validate without printing the config.
pub fn run_validate(path: Option<&Path>) -> i32 {
    match CacheConfig::load(path) {
        Ok(_) => {
            println!("Configuration valid");
            0
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            2
        }
    }
}

fn print_toml(config: &CacheConfig) -> i32 {
    match toml::to_string_pretty(config) {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Failed to render configuration: {}", e);
            1
        }
    }
}
