//! Terminal output formatting with colors.

use colored::Colorize;

use crate::result::{display_byte, BatchedReport, ExperimentReport, SimulationReport};
use crate::simulator::AccessPath;

/// Format a sampled experiment: one line per candidate with median, mean and
/// stdev in nanoseconds, then the ranking.
pub fn format_experiment(report: &ExperimentReport) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("cache-probe: warm vs cold\n");
    output.push_str(&sep);
    output.push('\n');
    output.push_str(&format!(
        "  Arena: {} bytes, {} trials, eviction {} bytes / {} stride\n",
        report.arena_size, report.trials, report.eviction.0, report.eviction.1
    ));
    output.push_str(&format!(
        "  Clock: {} ({:.1} ns resolution)\n\n",
        report.metadata.clock, report.metadata.clock_resolution_ns
    ));

    for row in &report.locations {
        let line = format!(
            "  index {:>10}: median {:>8.1} ns, mean {:>8.1} ns, stdev {:>8.1} ns",
            row.location, row.summary.median_ns, row.summary.mean_ns, row.summary.stdev_ns
        );
        if row.warmed {
            output.push_str(&format!("{}  {}\n", line, "(warmed)".cyan()));
        } else {
            output.push_str(&line);
            output.push('\n');
        }
    }

    output.push('\n');
    output.push_str("  Ranking (median, fastest first):\n");
    for (i, r) in report.ranking.iter().enumerate() {
        output.push_str(&format!(
            "    {:2}. index {:>10}  {:>8.1} ns\n",
            i + 1,
            r.location,
            r.time_ns
        ));
    }

    output.push('\n');
    if report.target.is_some() {
        if report.target_is_fastest() {
            output.push_str(&format!("  {}\n", "\u{2713} Warmed index is fastest".green().bold()));
        } else {
            output.push_str(&format!(
                "  {}\n",
                "\u{26A0} Warmed index is not fastest".yellow().bold()
            ));
        }
        if let Some(gap) = report.contrast_ns {
            output.push_str(&format!("    Contrast vs fastest other: {:+.1} ns\n", gap));
        }
    }

    push_warnings(&mut output, report.warnings.iter().map(|w| w.description()));
    output.push_str(&sep);
    output.push('\n');
    output
}

/// Format the batched experiment: average ns per read for each candidate.
pub fn format_batched(report: &BatchedReport) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("cache-probe: batched average\n");
    output.push_str(&sep);
    output.push('\n');

    for r in &report.averages {
        let warmed = if Some(r.location) == report.target {
            format!("  {}", "(warmed)".cyan())
        } else {
            String::new()
        };
        output.push_str(&format!(
            "  index {:>10}: {:>10.3} ns per access (mean of {}){}\n",
            r.location, r.time_ns, report.iterations, warmed
        ));
    }

    output.push_str(&sep);
    output.push('\n');
    output
}

/// Format a simulated leak: ranked top pages, then the true byte.
pub fn format_simulation(report: &SimulationReport) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("cache-probe: secret-byte simulation (local data only)\n");
    output.push_str(&sep);
    output.push('\n');
    output.push_str(&format!(
        "  Query index {} of {}-byte secret ({})\n",
        report.query_index,
        report.secret_len,
        match report.path {
            AccessPath::InBounds => "in bounds",
            AccessPath::Fallback => "out of bounds: default page touched",
        }
    ));
    if report.rounds > 1 {
        output.push_str(&format!("  Median of {} rounds per page\n", report.rounds));
    }
    output.push('\n');

    output.push_str(&format!("  Top {} fastest pages:\n", report.top.len()));
    for (i, page) in report.top.iter().enumerate() {
        output.push_str(&format!(
            "  {:2}. page {:3}  char: {:>4}  time: {:.0} ns\n",
            i + 1,
            page.page,
            page.character,
            page.time_ns
        ));
    }
    output.push('\n');

    match report.expected_byte {
        Some(byte) => {
            output.push_str(&format!(
                "  The page for byte {} of the secret is {} ('{}').\n",
                report.query_index,
                byte,
                display_byte(byte as usize)
            ));
            if report.recovered == Some(true) {
                output.push_str(&format!("  {}\n", "\u{2713} Top page matches".green().bold()));
            } else {
                output.push_str(&format!("  {}\n", "\u{2717} Top page does not match".red().bold()));
            }
        }
        None => {
            output.push_str(&format!(
                "  Index is outside the secret; page {} was touched instead.\n",
                report.touched_page
            ));
        }
    }

    push_warnings(&mut output, report.warnings.iter().map(|w| w.description()));
    output.push_str(&sep);
    output.push('\n');
    output
}

fn push_warnings<I: Iterator<Item = String>>(output: &mut String, warnings: I) {
    for warning in warnings {
        output.push_str(&format!("  {} {}\n", "\u{26A0}".yellow(), warning));
    }
}
