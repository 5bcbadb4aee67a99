pub mod types;

pub use types::{FileBreakdown, LinterCounts, RuleBreakdown, ServiceMetrics};

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use types::{Checkstyle, IssuesResponse, MeasuresResponse};

/// Number of entries kept in every ranking.
pub const TOP_N: usize = 5;

/// Namespace prefix the linter puts in front of its rule ids.
const LINTER_RULE_PREFIX: &str = "detekt.";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to parse linter report: {0}")]
    LinterXml(#[from] quick_xml::DeError),

    #[error("Failed to parse analysis service payload: {0}")]
    ServiceJson(#[from] serde_json::Error),
}

/// Count linter issues per severity across every file of a checkstyle report.
///
/// Entries with a severity other than `error`, `warning` or `info` are skipped.
pub fn parse_linter_report(xml: &str) -> Result<LinterCounts, ReportError> {
    let report: Checkstyle = quick_xml::de::from_str(xml)?;

    let mut counts = LinterCounts::default();
    for entry in report.files.iter().flat_map(|f| f.entries.iter()) {
        match entry.severity.as_str() {
            "error" => counts.error_issues += 1,
            "warning" => counts.warning_issues += 1,
            "info" => counts.info_issues += 1,
            other => debug!(severity = %other, "ignoring linter entry with unknown severity"),
        }
    }
    Ok(counts)
}

/// Map a maintainability letter grade to its ordinal.
pub fn rating_to_number(rating: &str) -> i64 {
    match rating {
        "A" => 1,
        "B" => 2,
        "C" => 3,
        "D" => 4,
        "E" => 5,
        _ => 0,
    }
}

/// Normalize an analysis service measures document.
///
/// Unknown metric keys are ignored and absent ones stay at zero. Values that
/// do not parse as integers count as zero.
pub fn parse_measures(json: &str) -> Result<ServiceMetrics, ReportError> {
    let response: MeasuresResponse = serde_json::from_str(json)?;

    let mut metrics = ServiceMetrics::default();
    for measure in &response.component.measures {
        let value = || measure.value.trim().parse::<i64>().unwrap_or(0);
        match measure.metric.as_str() {
            "ncloc" => metrics.lines_of_code = value(),
            "sqale_rating" => metrics.maintainability_rating = rating_to_number(&measure.value),
            "cognitive_complexity" => metrics.cognitive_complexity = value(),
            "blocker_violations" => metrics.blocker_issues = value(),
            "critical_violations" => metrics.critical_issues = value(),
            "major_violations" => metrics.major_issues = value(),
            "minor_violations" => metrics.minor_issues = value(),
            "info_violations" => metrics.info_issues = value(),
            "code_smells" => metrics.code_smells = value(),
            "bugs" => metrics.bugs = value(),
            "vulnerabilities" => metrics.vulnerabilities = value(),
            _ => {}
        }
    }
    Ok(metrics)
}

/// Rank the analysis service issues by rule and by file, top five each.
pub fn rank_service_issues(
    json: &str,
) -> Result<(Vec<RuleBreakdown>, Vec<FileBreakdown>), ReportError> {
    let response: IssuesResponse = serde_json::from_str(json)?;

    let rules = top_n(response.issues.iter().map(|i| i.rule.as_str()))
        .into_iter()
        .map(|(rule_name, issue_count)| RuleBreakdown {
            rule_name,
            issue_count,
        })
        .collect();

    let files = top_n(response.issues.iter().map(|i| file_of_component(&i.component)))
        .into_iter()
        .map(|(file_name, issue_count)| FileBreakdown {
            file_name,
            issue_count,
        })
        .collect();

    Ok((rules, files))
}

/// Rank linter rules by issue count, top five.
///
/// The checkstyle format yields no per-file ranking here; only rules are ranked.
pub fn rank_linter_rules(xml: &str) -> Result<Vec<RuleBreakdown>, ReportError> {
    let report: Checkstyle = quick_xml::de::from_str(xml)?;

    let sources = report
        .files
        .iter()
        .flat_map(|f| f.entries.iter())
        .map(|e| e.source.strip_prefix(LINTER_RULE_PREFIX).unwrap_or(&e.source));

    Ok(top_n(sources)
        .into_iter()
        .map(|(rule_name, issue_count)| RuleBreakdown {
            rule_name,
            issue_count,
        })
        .collect())
}

/// Strip the project key from a component id (`<project>:<path>`).
fn file_of_component(component: &str) -> &str {
    component
        .split_once(':')
        .map(|(_, path)| path)
        .unwrap_or(component)
}

/// Count keys and keep the `TOP_N` most frequent.
///
/// Equal counts keep the order in which the keys were first seen.
fn top_n<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for key in keys {
        match index.get(key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key, counts.len());
                counts.push((key.to_string(), 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(TOP_N);
    counts
}
