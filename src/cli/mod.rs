//! CLI module for occusim.
//!
//! All CLI logic lives here rather than in main.rs so it can be tested.
//! The entry point `run_cli` is called from main.rs with parsed arguments.

mod args;
mod commands;
mod output;

pub use args::{Args, Command};
pub use commands::{load_scenario, run_cli};
pub use output::{
    format_data_summary, format_interpretation, format_report, print_help, print_report,
    print_version,
};
