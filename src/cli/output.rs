//! CLI output formatting.
//!
//! Every printer has a `format_*` counterpart returning the text so the
//! wording can be tested.

use std::fmt::Write as _;

use crate::scenarios::{DataSummary, ScenarioReport};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Print version information.
pub fn print_version() {
    println!(
        "occusim {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("OCCUSIM_GIT_HASH")
    );
}

/// Print help message.
pub fn print_help() {
    println!(
        r"occusim - Occupancy model simulation and MCMC fitting

USAGE:
    occusim <COMMAND> [OPTIONS]

COMMANDS:
    run <scenario.yaml>         Simulate data, fit the model, summarise
        --seed <N>              Override the scenario seed
        --engine <NAME>         builtin (default) or jags
        --json                  Print the report as JSON
        -v, --verbose           Debug logging and per-chain detail

    simulate <scenario.yaml>    Simulate data and print its summary
        --seed <N>              Override the scenario seed

    model <scenario.yaml>       Print the model text

    walkthrough                 Run the model-of-the-mean and vegetation
                                scenarios in sequence
        --seed <N>              Override both seeds
        -v, --verbose           Debug logging

    help                        Show this help message
    version                     Show version information

EXAMPLES:
    occusim run configs/model_of_the_mean.yaml
    occusim run configs/vegetation.yaml --engine jags
    occusim walkthrough --seed 7

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=occusim=debug) to override the log filter.
"
    );
}

/// Print a boxed section header.
pub fn print_header(title: &str) {
    println!("{}", format_header(title));
}

/// Boxed section header.
#[must_use]
pub fn format_header(title: &str) -> String {
    let width = 63;
    let bar = "═".repeat(width);
    format!("╔{bar}╗\n║ {title:<w$}║\n╚{bar}╝\n", w = width - 1)
}

/// Print the simulated-data summary.
pub fn print_data_summary(data: &DataSummary) {
    print!("{}", format_data_summary(data));
}

/// Simulated-data summary with the naive-estimate explanation.
#[must_use]
pub fn format_data_summary(data: &DataSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Simulated data:");
    let _ = writeln!(out, "  Sites:                 {}", data.sites);
    let _ = writeln!(out, "  Surveys per site:      {}", data.surveys);
    let _ = writeln!(
        out,
        "  Occupied sites:        {} (true occupancy {:.2})",
        data.occupied_sites, data.true_occupancy_rate
    );
    let _ = writeln!(
        out,
        "  Sites with detections: {} (naive occupancy {:.2})",
        data.detected_sites, data.naive_occupancy_rate
    );
    let _ = writeln!(
        out,
        "  Detection frequency:   {:.2} per survey at occupied sites",
        data.detection_frequency
    );
    let missed = data.occupied_sites.saturating_sub(data.detected_sites);
    let _ = writeln!(
        out,
        "\n  {missed} occupied site(s) were never detected, so the naive estimate\n  \
         undershoots the truth. The hierarchical model separates\n  \
         occupancy from detection to correct for this."
    );
    out
}

/// Print a full scenario report.
pub fn print_report(report: &ScenarioReport, verbose: bool) {
    print!("{}", format_report(report, verbose));
}

/// Full scenario report: data, posterior table and interpretation.
#[must_use]
pub fn format_report(report: &ScenarioReport, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Scenario: {}", report.scenario);
    let _ = writeln!(out, "Model:    {}", report.model);
    let _ = writeln!(out, "Engine:   {}", report.engine);
    let _ = writeln!(out, "Seed:     {}", report.seed);
    let _ = writeln!(out, "{RULE}\n");

    out.push_str(&format_data_summary(&report.data));
    if verbose {
        let _ = writeln!(out, "\nModel text:\n{}", report.model_text);
    }

    let _ = writeln!(
        out,
        "\nPosterior summary ({} chains, {} draws each):\n",
        report.summary.chains, report.summary.kept_per_chain
    );
    let _ = writeln!(out, "{}", report.summary);
    out.push_str(&format_interpretation(report));
    out
}

/// Plain-language reading of the posterior against the truth.
#[must_use]
pub fn format_interpretation(report: &ScenarioReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Interpretation:");
    for truth in &report.truth {
        let Some(row) = report.summary.get(&truth.name) else {
            continue;
        };
        let covered = row.lower95() <= truth.value && truth.value <= row.upper95();
        let _ = writeln!(
            out,
            "  {:<10} true {:>7.3}  posterior mean {:>7.3}  95% CrI [{:.3}, {:.3}] {}",
            truth.name,
            truth.value,
            row.mean,
            row.lower95(),
            row.upper95(),
            if covered { "✓ covers truth" } else { "✗ misses truth" }
        );
    }

    if let Some(psi) = report.summary.get("psi") {
        let _ = writeln!(
            out,
            "\n  Naive occupancy {:.2} vs. estimated {:.2}: accounting for\n  \
             imperfect detection raises the occupancy estimate.",
            report.data.naive_occupancy_rate, psi.mean
        );
    }
    if let Some(fs) = report.summary.get("occ.fs") {
        let _ = writeln!(
            out,
            "\n  Finite-sample occupancy: {:.1} occupied sites estimated,\n  \
             {} truly occupied, {} observed.",
            fs.mean, report.data.occupied_sites, report.data.detected_sites
        );
    }

    if report.converged {
        let _ = writeln!(out, "\n  ✓ All chains converged (Rhat below threshold).");
    } else {
        let _ = writeln!(
            out,
            "\n  ✗ Some parameters have not converged; run longer chains."
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> DataSummary {
        DataSummary {
            sites: 100,
            surveys: 3,
            occupied_sites: 70,
            detected_sites: 55,
            true_occupancy_rate: 0.7,
            naive_occupancy_rate: 0.55,
            detection_frequency: 0.4,
        }
    }

    #[test]
    fn test_header_box() {
        let header = format_header("occusim");
        assert!(header.starts_with('╔'));
        assert!(header.contains("║ occusim"));
        assert_eq!(header.lines().count(), 3);
    }

    #[test]
    fn test_data_summary_counts_missed_sites() {
        let text = format_data_summary(&data());
        assert!(text.contains("15 occupied site(s) were never detected"));
        assert!(text.contains("naive occupancy 0.55"));
    }
}
