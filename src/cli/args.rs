//! CLI argument parsing.
//!
//! Hand-rolled so that `parse_from` can be tested with any iterator of
//! strings.

use std::path::PathBuf;

use crate::config::EngineKind;

/// CLI arguments container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// The command to execute.
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simulate, fit and summarise one scenario.
    Run {
        /// Path to the scenario YAML file.
        scenario_path: PathBuf,
        /// Optional seed override.
        seed_override: Option<u64>,
        /// Optional engine override.
        engine_override: Option<EngineKind>,
        /// Print the report as JSON instead of text.
        json: bool,
        /// Enable verbose output.
        verbose: bool,
    },
    /// Simulate data and print its summary only.
    Simulate {
        /// Path to the scenario YAML file.
        scenario_path: PathBuf,
        /// Optional seed override.
        seed_override: Option<u64>,
    },
    /// Print the model text of a scenario.
    Model {
        /// Path to the scenario YAML file.
        scenario_path: PathBuf,
    },
    /// Run both built-in scenarios in sequence.
    Walkthrough {
        /// Optional seed override applied to both scenarios.
        seed_override: Option<u64>,
        /// Enable verbose output.
        verbose: bool,
    },
    /// Show help
    Help,
    /// Show version
    Version,
}

/// Flags shared by the commands.
#[derive(Debug, Default)]
struct Flags {
    seed: Option<u64>,
    engine: Option<EngineKind>,
    json: bool,
    verbose: bool,
}

impl Args {
    /// Parse command-line arguments from an iterator.
    ///
    /// This method is testable as it accepts any iterator of strings,
    /// not just `std::env::args()`.
    #[must_use]
    pub fn parse_from<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse_from_vec(&args)
    }

    /// Parse command-line arguments from the environment.
    #[must_use]
    pub fn parse() -> Self {
        Self::parse_from(std::env::args())
    }

    /// Whether debug logging was requested.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        matches!(
            self.command,
            Command::Run { verbose: true, .. } | Command::Walkthrough { verbose: true, .. }
        )
    }

    /// Internal parsing from a vector of strings.
    fn parse_from_vec(args: &[String]) -> Self {
        if args.len() < 2 {
            return Self {
                command: Command::Help,
            };
        }

        let command = match args[1].as_str() {
            "run" => Self::with_path(args, "run", |path, flags| Command::Run {
                scenario_path: path,
                seed_override: flags.seed,
                engine_override: flags.engine,
                json: flags.json,
                verbose: flags.verbose,
            }),
            "simulate" => Self::with_path(args, "simulate", |path, flags| Command::Simulate {
                scenario_path: path,
                seed_override: flags.seed,
            }),
            "model" => Self::with_path(args, "model", |path, _| Command::Model {
                scenario_path: path,
            }),
            "walkthrough" => {
                let flags = Self::parse_flags(&args[2..]);
                Command::Walkthrough {
                    seed_override: flags.seed,
                    verbose: flags.verbose,
                }
            }
            "-h" | "--help" | "help" => Command::Help,
            "-V" | "--version" | "version" => Command::Version,
            unknown => {
                eprintln!("Unknown command: {unknown}");
                Command::Help
            }
        };

        Self { command }
    }

    /// Commands taking a scenario path as their first argument.
    fn with_path(args: &[String], name: &str, build: impl FnOnce(PathBuf, Flags) -> Command) -> Command {
        match args.get(2) {
            Some(path) if !path.starts_with('-') => {
                build(PathBuf::from(path), Self::parse_flags(&args[3..]))
            }
            _ => {
                eprintln!("Error: '{name}' command requires a scenario path");
                Command::Help
            }
        }
    }

    fn parse_flags(args: &[String]) -> Flags {
        let mut flags = Flags::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--seed" => {
                    match args.get(i + 1).map(|s| s.parse::<u64>()) {
                        Some(Ok(seed)) => flags.seed = Some(seed),
                        Some(Err(_)) => eprintln!("Warning: ignoring invalid seed '{}'", args[i + 1]),
                        None => eprintln!("Warning: --seed requires a value"),
                    }
                    i += 2;
                }
                "--engine" => {
                    match args.get(i + 1).map(|s| EngineKind::from_name(s)) {
                        Some(Some(engine)) => flags.engine = Some(engine),
                        Some(None) => eprintln!("Warning: unknown engine '{}'", args[i + 1]),
                        None => eprintln!("Warning: --engine requires a value"),
                    }
                    i += 2;
                }
                "--json" => {
                    flags.json = true;
                    i += 1;
                }
                "-v" | "--verbose" => {
                    flags.verbose = true;
                    i += 1;
                }
                other => {
                    eprintln!("Warning: ignoring unknown option '{other}'");
                    i += 1;
                }
            }
        }
        flags
    }
}
