// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! bocache-cli entry point.
//!
//! Installs logging, then dispatches to the simulate and config commands.

mod cli_parser;

use std::process::ExitCode;

use bocache::cli::{config_cmd, parse_args, print_report_human, run_simulation};
use bocache::CacheConfig;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().collect();
    let log_json = cli_parser::take_flag(&mut args, "--log-json");
    let config_path = match cli_parser::take_config_path(&mut args) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2u8);
        }
    };
    init_logging(log_json);

    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    match command {
        "simulate" => run_simulate_cmd(&args, config_path.as_deref()),
        "config" => run_config_cmd(&args, config_path.as_deref()),
        "help" | "--help" | "-h" => {
            if let Some(sub) = args.get(2) {
                cli_parser::print_command_help(sub);
            } else {
                cli_parser::print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("bocache {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            cli_parser::print_usage();
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

fn run_simulate_cmd(args: &[String], config_path: Option<&std::path::Path>) -> ExitCode {
    let opts = match parse_args(args, 2) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", e);
            cli_parser::print_command_help("simulate");
            return ExitCode::FAILURE;
        }
    };
    let config = match CacheConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2u8);
        }
    };

    let report = match run_simulation(&opts, config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Simulation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if opts.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report_human(&report);
    }
    ExitCode::SUCCESS
}

fn run_config_cmd(args: &[String], config_path: Option<&std::path::Path>) -> ExitCode {
    let sub = args.get(2).map(|s| s.as_str()).unwrap_or("show");
    let code = match sub {
        "show" => config_cmd::run_show(config_path),
        "defaults" => config_cmd::run_defaults(),
        "validate" => config_cmd::run_validate(config_path),
        _ => {
            eprintln!("Unknown config subcommand: {}", sub);
            cli_parser::print_command_help("config");
            1
        }
    };
    ExitCode::from(code as u8)
}
