//! CLI command handlers.
//!
//! Each handler prints its results and maps errors to exit code 1.

use std::path::Path;
use std::process::ExitCode;

use tracing::error;

use super::output::{print_data_summary, print_header, print_help, print_report, print_version};
use super::{Args, Command};
use crate::config::{EngineKind, ScenarioConfig};
use crate::error::SimResult;
use crate::scenarios::{self, DataSummary, OccupancyScenario};

/// Main CLI entry point.
///
/// Dispatches to the appropriate command handler based on parsed arguments.
#[must_use]
pub fn run_cli(args: Args) -> ExitCode {
    let result = match args.command {
        Command::Run {
            scenario_path,
            seed_override,
            engine_override,
            json,
            verbose,
        } => run_scenario(&scenario_path, seed_override, engine_override, json, verbose),
        Command::Simulate {
            scenario_path,
            seed_override,
        } => simulate(&scenario_path, seed_override),
        Command::Model { scenario_path } => print_model(&scenario_path),
        Command::Walkthrough {
            seed_override,
            verbose,
        } => walkthrough(seed_override, verbose),
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Load a scenario file and apply command-line overrides.
///
/// # Errors
///
/// Returns load and validation errors.
pub fn load_scenario(
    path: &Path,
    seed_override: Option<u64>,
    engine_override: Option<EngineKind>,
) -> SimResult<OccupancyScenario> {
    let mut config = ScenarioConfig::load(path)?;
    if let Some(seed) = seed_override {
        config.reproducibility.seed = seed;
    }
    if let Some(kind) = engine_override {
        config.engine.kind = kind;
    }
    OccupancyScenario::new(config)
}

/// Simulate, fit and print one scenario.
///
/// # Errors
///
/// Returns scenario errors and JSON encoding failures.
pub fn run_scenario(
    path: &Path,
    seed_override: Option<u64>,
    engine_override: Option<EngineKind>,
    json: bool,
    verbose: bool,
) -> SimResult<()> {
    let scenario = load_scenario(path, seed_override, engine_override)?;
    let report = scenario.run()?;
    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| crate::error::SimError::serialization(e.to_string()))?;
        println!("{text}");
    } else {
        print_header("occusim - Occupancy Scenario");
        print_report(&report, verbose);
    }
    Ok(())
}

/// Simulate and summarise data only.
///
/// # Errors
///
/// Returns load and simulator errors.
pub fn simulate(path: &Path, seed_override: Option<u64>) -> SimResult<()> {
    let scenario = load_scenario(path, seed_override, None)?;
    let data = scenario.simulate()?;
    print_header("occusim - Data Simulation");
    println!("Scenario: {}\n", scenario.config().scenario.name);
    print_data_summary(&DataSummary::from_data(&data));
    Ok(())
}

/// Print the model text of a scenario.
///
/// # Errors
///
/// Returns load errors.
pub fn print_model(path: &Path) -> SimResult<()> {
    let scenario = load_scenario(path, None, None)?;
    print!("{}", scenario.model());
    Ok(())
}

/// Run both built-in scenarios in sequence.
///
/// # Errors
///
/// Returns the first scenario error.
pub fn walkthrough(seed_override: Option<u64>, verbose: bool) -> SimResult<()> {
    print_header("occusim - Occupancy Modeling Walkthrough");
    for (step, mut config) in scenarios::walkthrough().into_iter().enumerate() {
        if let Some(seed) = seed_override {
            config.reproducibility.seed = seed;
        }
        println!(
            "\nStep {}: {} ({})\n",
            step + 1,
            config.scenario.name,
            config.scenario.description
        );
        let report = OccupancyScenario::new(config)?.run()?;
        print_report(&report, verbose);
    }
    Ok(())
}
