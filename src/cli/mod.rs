// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Command implementations behind `bocache-cli`.

pub mod config_cmd;
pub mod simulate;
pub mod simulate_format;

pub use simulate::{parse_args, run_simulation, SimulateOptions, SimulationReport};
pub use simulate_format::print_report_human;
