//! Driver for an external JAGS binary.
//!
//! A run happens in a scratch directory:
//!
//! ```text
//! model.txt        rendered model
//! data.R           data in R dump format (column-major)
//! inits<k>.R       initial values and RNG seed of chain k
//! run.cmd          batch script
//! CODAindex.txt    output: name, first line, last line
//! CODAchain<k>.txt output: iteration, value
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::data::DataSet;
use super::samples::{ChainTrace, Samples};
use super::{ChainSettings, McmcEngine, SamplerJob, DEVIANCE};
use crate::error::{SimError, SimResult};

/// RNG used for every chain; JAGS seeds it from `.RNG.seed`.
pub const RNG_NAME: &str = "base::Mersenne-Twister";

const SCRIPT: &str = "run.cmd";
const CODA_STEM: &str = "CODA";

/// External engine.
#[derive(Debug, Clone)]
pub struct JagsEngine {
    binary: PathBuf,
    work_dir: Option<PathBuf>,
}

impl Default for JagsEngine {
    fn default() -> Self {
        Self::new("jags")
    }
}

impl JagsEngine {
    /// Engine invoking `binary` (looked up on `PATH` when not a path).
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: None,
        }
    }

    /// Keep the scratch files in `dir` instead of a temporary directory.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    fn execute(&self, job: &SamplerJob, dir: &Path) -> SimResult<Samples> {
        write_inputs(job, dir)?;

        debug!(binary = %self.binary.display(), dir = %dir.display(), "launching jags");
        let output = Command::new(&self.binary)
            .arg(SCRIPT)
            .current_dir(dir)
            .output()
            .map_err(|e| {
                SimError::engine(format!("failed to launch '{}': {e}", self.binary.display()))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(node) = inconsistent_node(&stdout).or_else(|| inconsistent_node(&stderr)) {
            return Err(SimError::InconsistentNode { node });
        }
        if !output.status.success() {
            return Err(SimError::engine(format!(
                "jags exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Some(message) = runtime_error(&stdout).or_else(|| runtime_error(&stderr)) {
            return Err(SimError::engine(format!("jags runtime error: {message}")));
        }

        let index = fs::read_to_string(dir.join(format!("{CODA_STEM}index.txt")))?;
        let chains = (1..=job.settings.chains)
            .map(|k| fs::read_to_string(dir.join(format!("{CODA_STEM}chain{k}.txt"))))
            .collect::<Result<Vec<_>, _>>()?;
        parse_coda(&index, &chains)
    }
}

impl McmcEngine for JagsEngine {
    fn name(&self) -> &'static str {
        "jags"
    }

    fn run(&self, job: &SamplerJob) -> SimResult<Samples> {
        job.check()?;
        info!(
            engine = self.name(),
            chains = job.settings.chains,
            iterations = job.settings.iterations,
            "running chains"
        );
        match &self.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                self.execute(job, dir)
            }
            None => {
                let dir = tempfile::tempdir()?;
                self.execute(job, dir.path())
            }
        }
    }
}

fn write_inputs(job: &SamplerJob, dir: &Path) -> SimResult<()> {
    job.model.write_to(dir.join("model.txt"))?;
    fs::write(dir.join("data.R"), render_dump(&job.data))?;
    for (k, inits) in job.inits.iter().enumerate() {
        fs::write(
            dir.join(format!("inits{}.R", k + 1)),
            render_inits(&inits.values, inits.seed),
        )?;
    }
    fs::write(dir.join(SCRIPT), render_script(&job.monitor, &job.settings))?;
    Ok(())
}

fn r_number(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{value}")
    }
}

/// Render a data set in R `dump` format.
#[must_use]
pub fn render_dump(data: &DataSet) -> String {
    let mut out = String::new();
    for (name, array) in data.iter() {
        let values: Vec<String> = array.values().iter().map(|&v| r_number(v)).collect();
        let _ = match array.dims() {
            [] => writeln!(out, "\"{name}\" <- {}", values.join(", ")),
            [_] => writeln!(out, "\"{name}\" <- c({})", values.join(", ")),
            dims => {
                let dims: Vec<String> = dims.iter().map(|d| format!("{d}L")).collect();
                writeln!(
                    out,
                    "\"{name}\" <- structure(c({}), .Dim = c({}))",
                    values.join(", "),
                    dims.join(", ")
                )
            }
        };
    }
    out
}

/// Render one chain's inits file, including the RNG settings.
#[must_use]
pub fn render_inits(values: &DataSet, seed: u64) -> String {
    let mut out = render_dump(values);
    let _ = writeln!(out, "\".RNG.name\" <- \"{RNG_NAME}\"");
    let _ = writeln!(out, "\".RNG.seed\" <- {}", seed % (1 << 31));
    out
}

/// Render the batch script.
#[must_use]
pub fn render_script(monitor: &[String], settings: &ChainSettings) -> String {
    let mut out = String::new();
    if monitor.iter().any(|m| m == DEVIANCE) {
        out.push_str("load dic\n");
    }
    out.push_str("model in \"model.txt\"\n");
    out.push_str("data in \"data.R\"\n");
    let _ = writeln!(out, "compile, nchains({})", settings.chains);
    for k in 1..=settings.chains {
        let _ = writeln!(out, "parameters in \"inits{k}.R\", chain({k})");
    }
    out.push_str("initialize\n");
    if settings.burn_in > 0 {
        let _ = writeln!(out, "update {}", settings.burn_in);
    }
    for name in monitor {
        let _ = writeln!(out, "monitor {name}, thin({})", settings.thin);
    }
    let _ = writeln!(out, "update {}", settings.iterations - settings.burn_in);
    let _ = writeln!(out, "coda *, stem({CODA_STEM})");
    out.push_str("exit\n");
    out
}

/// Node named in a "Node inconsistent with parents" message.
fn inconsistent_node(output: &str) -> Option<String> {
    if !output.contains("inconsistent with parents") {
        return None;
    }
    output.lines().find_map(|line| {
        line.split("Error in node ")
            .nth(1)
            .map(|rest| rest.trim().to_string())
    })
}

/// Message of a `RUNTIME ERROR` block; JAGS may still exit with status 0.
fn runtime_error(output: &str) -> Option<String> {
    let (_, rest) = output.split_once("RUNTIME ERROR")?;
    let message: Vec<&str> = rest
        .trim_start_matches(':')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    Some(if message.is_empty() {
        "no details".to_string()
    } else {
        message.join(" ")
    })
}

/// Parse CODA index and chain files.
///
/// # Errors
///
/// Returns `Engine` for malformed lines and `DimensionMismatch` when
/// chains disagree in length.
pub fn parse_coda(index: &str, chains: &[String]) -> SimResult<Samples> {
    let mut entries = Vec::new();
    for (n, line) in index.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => continue,
            [name, first, last] => {
                let parse = |s: &str| {
                    s.parse::<usize>().map_err(|_| {
                        SimError::engine(format!("CODA index line {}: bad line number '{s}'", n + 1))
                    })
                };
                let (first, last) = (parse(first)?, parse(last)?);
                if first == 0 || last < first {
                    return Err(SimError::engine(format!(
                        "CODA index line {}: empty range {first}..{last}",
                        n + 1
                    )));
                }
                entries.push(((*name).to_string(), first, last));
            }
            _ => {
                return Err(SimError::engine(format!(
                    "CODA index line {}: expected 3 fields, found {}",
                    n + 1,
                    fields.len()
                )))
            }
        }
    }

    let mut traces = Vec::with_capacity(chains.len());
    for (c, text) in chains.iter().enumerate() {
        let values = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                line.split_whitespace()
                    .nth(1)
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| {
                        SimError::engine(format!("CODA chain {} line {}: '{line}'", c + 1, n + 1))
                    })
            })
            .collect::<SimResult<Vec<f64>>>()?;

        let series = entries
            .iter()
            .map(|(name, first, last)| {
                values.get(first - 1..*last).map(<[f64]>::to_vec).ok_or_else(|| {
                    SimError::engine(format!(
                        "CODA chain {} is too short for '{name}' (lines {first}..{last})",
                        c + 1
                    ))
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        traces.push(ChainTrace::from_series(series));
    }

    let names = entries.into_iter().map(|(name, _, _)| name).collect();
    Samples::new(names, traces)
}
