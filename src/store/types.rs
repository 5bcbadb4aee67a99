use chrono::{DateTime, Utc};
use serde::Serialize;

/// A (user, repository URL) pair that scans are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub user_id: i64,
    /// Last path segment of the URL without a trailing `.git`
    pub name: String,
    pub url: String,
}

impl Project {
    /// Key that namespaces this project inside the analysis service.
    pub fn component_key(&self) -> String {
        format!("proj_{}_{}", self.user_id, self.id)
    }
}

/// One analysis run. The aggregate fields stay at zero until measures are normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Scan {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    pub lines_of_code: i64,
    pub maintainability_rating: i64,
    pub cognitive_complexity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ProjectSummary {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub last_scan: Option<DateTime<Utc>>,
}

/// A scan with its issue totals; totals are zero when the result is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ScanSummary {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub linter_issue_count: i64,
    pub service_issue_count: i64,
}

/// One historical scan's metrics, as plotted in the trend series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TrendPoint {
    pub scan_id: i64,
    pub started_at: DateTime<Utc>,
    pub maintainability_rating: i64,
    pub cognitive_complexity: i64,
    pub lines_of_code: i64,
    pub total_linter_issues: i64,
    pub total_service_issues: i64,
    pub blocker_issues: i64,
    pub critical_issues: i64,
    pub major_issues: i64,
}

/// Raw payloads and type counts of a project's most recent scan.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LatestScan {
    pub scan_id: i64,
    pub issues_json: Option<String>,
    pub linter_xml: Option<String>,
    pub bugs: i64,
    pub vulnerabilities: i64,
    pub code_smells: i64,
}
