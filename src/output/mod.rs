//! Run summaries printed at the end of a command
//!
//! Formatting is kept separate from printing so summaries can be checked
//! without capturing stdout.

use crate::crawler::CrawlReport;
use crate::pipeline::PipelineReport;
use crate::prober::ProbeReport;

/// Formats a crawl report
///
/// # Arguments
///
/// * `report` - The finished (or interrupted) crawl
///
/// # Returns
///
/// A multi-line plain text summary
pub fn format_crawl_report(report: &CrawlReport) -> String {
    let mut out = String::new();

    out.push_str("Crawl:\n");
    out.push_str(&format!("  State: {}\n", report.state));
    out.push_str(&format!("  Pages visited: {}\n", report.visited.len()));
    out.push_str(&format!("  Pages failed: {}\n", report.failed.len()));
    out.push_str(&format!("  Forms submitted: {}\n", report.forms_submitted));
    out.push_str(&format!("  Links enqueued: {}\n", report.links_enqueued));
    if report.remaining > 0 {
        out.push_str(&format!("  Still queued: {}\n", report.remaining));
    }

    if !report.failed.is_empty() {
        out.push_str("  Failed URLs:\n");
        for url in &report.failed {
            out.push_str(&format!("    - {}\n", url));
        }
    }

    out
}

pub fn format_probe_report(report: &ProbeReport) -> String {
    format!(
        "Probing:\n  Endpoints: {}\n  Requests: {} ({} succeeded, {} failed)\n",
        report.endpoints, report.attempted, report.succeeded, report.failed
    )
}

/// Formats a full pipeline report
pub fn format_report(report: &PipelineReport) -> String {
    let mut out = String::from("=== Surface-Scout Summary ===\n\n");

    out.push_str(&format_crawl_report(&report.crawl));
    out.push('\n');

    if report.interrupted && report.api_base.is_none() {
        out.push_str("Run interrupted during the crawl; resume with --resume\n");
        return out;
    }

    out.push_str("Traffic:\n");
    out.push_str(&format!("  Entries recorded: {}\n", report.traffic_entries));
    match (&report.prefix, &report.api_base) {
        (Some(prefix), _) => out.push_str(&format!("  API prefix: {}\n", prefix)),
        (None, Some(base)) => out.push_str(&format!("  API prefix: none detected, using {}\n", base)),
        (None, None) => {}
    }
    out.push('\n');

    if let Some(probe) = &report.probe {
        out.push_str(&format_probe_report(probe));
        out.push('\n');
    }

    out.push_str("Artifacts:\n");
    if let Some(path) = &report.initial_spec {
        out.push_str(&format!("  Initial spec: {}\n", path.display()));
    }
    if let Some(path) = &report.final_spec {
        out.push_str(&format!("  Final spec: {}\n", path.display()));
    }
    if let Some(error) = &report.synth_error {
        out.push_str(&format!("  Spec generation failed: {}\n", error));
    }
    if report.interrupted {
        out.push_str("  Run interrupted before completion\n");
    }

    out
}

/// Prints a pipeline report to stdout
pub fn print_report(report: &PipelineReport) {
    print!("{}", format_report(report));
}

/// Prints a crawl report to stdout
pub fn print_crawl_report(report: &CrawlReport) {
    print!("{}", format_crawl_report(report));
}
