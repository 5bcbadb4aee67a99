use serde::Serialize;

use crate::report::{FileBreakdown, RuleBreakdown};
use crate::store::TrendPoint;

/// Issue-type split of the most recent scan's analysis service result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub bugs: i64,
    pub vulnerabilities: i64,
    pub code_smells: i64,
}

/// Top rules of the latest scan, from each source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleRankings {
    pub service: Vec<RuleBreakdown>,
    pub linter: Vec<RuleBreakdown>,
}

/// Everything shown for one project: history plus the latest scan's breakdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectAnalytics {
    pub project_id: i64,
    pub trend: Vec<TrendPoint>,
    pub latest_distribution: Distribution,
    pub latest_service_rules: Vec<RuleBreakdown>,
    pub latest_linter_rules: Vec<RuleBreakdown>,
    /// From the analysis service only; linter reports yield no file ranking.
    pub latest_noisy_files: Vec<FileBreakdown>,
}
