use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use super::ProjectAnalytics;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write analytics file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to encode analytics: {0}")]
    Json(#[from] serde_json::Error),
}

/// Print analytics to the terminal, or write them as JSON when a path is given.
#[instrument(skip(analytics), fields(project_id = analytics.project_id, scans = analytics.trend.len()))]
pub fn output(analytics: &ProjectAnalytics, output_path: Option<&Path>) -> Result<(), OutputError> {
    match output_path {
        None => {
            debug!("writing analytics to terminal");
            print_terminal(analytics);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing analytics to file");
            output_section(analytics, Some(path))
        }
    }
}

/// Print one analytics section as JSON, or write it to `output_path`.
pub fn output_section<T: Serialize>(section: &T, output_path: Option<&Path>) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(section)?;
    match output_path {
        None => println!("{json}"),
        Some(path) => {
            debug!(path = %path.display(), "writing analytics section to file");
            std::fs::write(path, json)?;
        }
    }
    Ok(())
}

fn print_terminal(analytics: &ProjectAnalytics) {
    println!();
    println!("Project #{}: {} scan(s)", analytics.project_id, analytics.trend.len());
    println!();

    println!("═══ Trend ═══");
    if analytics.trend.is_empty() {
        println!("  No scans yet.");
    }
    for point in &analytics.trend {
        println!(
            "  #{:<5} {}  rating {}  complexity {:>6}  loc {:>7}  linter {:>5}  service {:>5} ({} blocker, {} critical, {} major)",
            point.scan_id,
            point.started_at.format("%Y-%m-%d %H:%M"),
            colorize_rating(point.maintainability_rating),
            point.cognitive_complexity,
            point.lines_of_code,
            point.total_linter_issues,
            point.total_service_issues,
            point.blocker_issues,
            point.critical_issues,
            point.major_issues,
        );
    }
    println!();

    let dist = &analytics.latest_distribution;
    println!("═══ Latest Distribution ═══");
    println!(
        "  {} bugs | {} vulnerabilities | {} code smells",
        dist.bugs.to_string().red(),
        dist.vulnerabilities.to_string().yellow(),
        dist.code_smells.to_string().cyan()
    );
    println!();

    print_ranking(
        "Top Service Rules",
        analytics.latest_service_rules.iter().map(|r| (r.rule_name.as_str(), r.issue_count)),
    );
    print_ranking(
        "Top Linter Rules",
        analytics.latest_linter_rules.iter().map(|r| (r.rule_name.as_str(), r.issue_count)),
    );
    print_ranking(
        "Noisiest Files",
        analytics.latest_noisy_files.iter().map(|f| (f.file_name.as_str(), f.issue_count)),
    );
}

fn print_ranking<'a>(title: &str, entries: impl Iterator<Item = (&'a str, usize)>) {
    println!("═══ {title} ═══");
    let mut empty = true;
    for (name, count) in entries {
        empty = false;
        println!("  {:>5}  {}", count.to_string().bold(), name);
    }
    if empty {
        println!("  None.");
    }
    println!();
}

/// Letter grade for a stored maintainability rating; 0 means no data.
fn colorize_rating(rating: i64) -> colored::ColoredString {
    match rating {
        1 => "A".green().bold(),
        2 => "B".green(),
        3 => "C".yellow(),
        4 => "D".red(),
        5 => "E".red().bold(),
        _ => "-".dimmed(),
    }
}
