use serde::{Deserialize, Deserializer, Serialize};

/// Per-severity issue counts from a linter (checkstyle-format) report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinterCounts {
    pub error_issues: i64,
    pub warning_issues: i64,
    pub info_issues: i64,
}

impl LinterCounts {
    pub fn total(&self) -> i64 {
        self.error_issues + self.warning_issues + self.info_issues
    }
}

/// Normalized measures for one component as reported by the analysis service.
///
/// Every field defaults to zero; a metric missing from the payload is not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceMetrics {
    pub lines_of_code: i64,
    /// Ordinal 1 (A) to 5 (E), 0 when unknown.
    pub maintainability_rating: i64,
    pub cognitive_complexity: i64,
    pub blocker_issues: i64,
    pub critical_issues: i64,
    pub major_issues: i64,
    pub minor_issues: i64,
    pub info_issues: i64,
    pub code_smells: i64,
    pub bugs: i64,
    pub vulnerabilities: i64,
}

impl ServiceMetrics {
    pub fn total_issues(&self) -> i64 {
        self.blocker_issues
            + self.critical_issues
            + self.major_issues
            + self.minor_issues
            + self.info_issues
    }
}

/// Issue count for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleBreakdown {
    pub rule_name: String,
    pub issue_count: usize,
}

/// Issue count for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileBreakdown {
    pub file_name: String,
    pub issue_count: usize,
}

// Wire schemas. Every field is defaulted so that a well-formed document with
// missing keys decodes to empty collections instead of failing.

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Checkstyle {
    #[serde(rename = "file", default)]
    pub files: Vec<CheckstyleFile>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CheckstyleFile {
    #[serde(rename = "error", default)]
    pub entries: Vec<CheckstyleEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CheckstyleEntry {
    #[serde(rename = "@severity", default)]
    pub severity: String,
    #[serde(rename = "@source", default)]
    pub source: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MeasuresResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub component: MeasuresComponent,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MeasuresComponent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub measures: Vec<Measure>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Measure {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct IssuesResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Issue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rule: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub component: String,
}

/// Decode an explicit `null` the same way as an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
