use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Query parameters for the issue search endpoint, after `componentKeys`.
pub const ISSUES_QUERY: &str = "s=FILE_LINE&resolved=false&ps=500&facets=severities,types&additionalFields=_all";

/// Metric keys requested from the measures endpoint.
pub const MEASURE_KEYS: &[&str] = &[
    "ncloc",
    "sqale_rating",
    "cognitive_complexity",
    "blocker_violations",
    "critical_violations",
    "major_violations",
    "minor_violations",
    "info_violations",
    "code_smells",
    "bugs",
    "vulnerabilities",
];

/// The analysis service endpoints used by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    IssuesSearch,
    MeasuresComponent,
    ProjectAnalyses,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::IssuesSearch => "api/issues/search",
            Endpoint::MeasuresComponent => "api/measures/component",
            Endpoint::ProjectAnalyses => "api/project_analyses/search",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Body of `api/project_analyses/search`.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysesResponse {
    #[serde(default)]
    pub analyses: Vec<Analysis>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub date: String,
}

impl AnalysesResponse {
    /// Date of the most recent analysis, if the service reported one we can read.
    pub fn latest_date(&self) -> Option<DateTime<Utc>> {
        self.analyses.first().and_then(|a| parse_service_date(&a.date))
    }
}

/// Parse an analysis date. The service writes offsets as `+0000`, which is not
/// RFC 3339, so both forms are accepted.
pub fn parse_service_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_service_offset_form() {
        let date = parse_service_date("2024-03-05T10:15:30+0100").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 3, 5, 9, 15, 30).unwrap());
    }

    #[test]
    fn test_parse_rfc3339_form() {
        let date = parse_service_date("2024-03-05T10:15:30Z").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 3, 5, 10, 15, 30).unwrap());
    }

    #[test]
    fn test_parse_garbage_date() {
        assert!(parse_service_date("yesterday").is_none());
        assert!(parse_service_date("").is_none());
    }

    #[test]
    fn test_latest_date_uses_first_analysis() {
        let body = r#"{"paging":{"pageIndex":1,"pageSize":1,"total":4},
            "analyses":[{"key":"AY1","date":"2024-03-05T10:15:30+0000","events":[]}]}"#;
        let response: AnalysesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.latest_date(),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 15, 30).unwrap())
        );
    }

    #[test]
    fn test_latest_date_no_analyses() {
        let response: AnalysesResponse = serde_json::from_str(r#"{"analyses":[]}"#).unwrap();
        assert!(response.latest_date().is_none());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::IssuesSearch.to_string(), "api/issues/search");
        assert_eq!(Endpoint::MeasuresComponent.to_string(), "api/measures/component");
    }
}
