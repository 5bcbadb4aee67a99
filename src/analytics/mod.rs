pub mod output;
pub mod types;

pub use types::{Distribution, ProjectAnalytics, RuleRankings};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::report::{self, FileBreakdown, RuleBreakdown};
use crate::store::{LatestScan, ScanStore, StoreError, TrendPoint};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Failed to load scan history: {0}")]
    Store(#[from] StoreError),
}

/// Read-side aggregation over a project's stored scans.
///
/// Rankings are recomputed from the raw payloads on every call.
pub struct Analytics {
    store: Arc<dyn ScanStore>,
}

impl Analytics {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self { store }
    }

    /// One point per scan, oldest first, counts zero where a result is missing.
    pub async fn trend(&self, user_id: i64, project_id: i64) -> Result<Vec<TrendPoint>, AnalyticsError> {
        Ok(self.store.trend(user_id, project_id).await?)
    }

    pub async fn latest_distribution(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Distribution, AnalyticsError> {
        let latest = self.store.latest_scan(user_id, project_id).await?;
        Ok(distribution(latest.as_ref()))
    }

    /// Top analysis service rules and top linter rules of the latest scan.
    pub async fn latest_rule_rankings(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<RuleRankings, AnalyticsError> {
        let latest = self.store.latest_scan(user_id, project_id).await?;
        let (service, _) = service_rankings(latest.as_ref());
        Ok(RuleRankings {
            service,
            linter: linter_rankings(latest.as_ref()),
        })
    }

    pub async fn latest_noisy_files(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Vec<FileBreakdown>, AnalyticsError> {
        let latest = self.store.latest_scan(user_id, project_id).await?;
        let (_, files) = service_rankings(latest.as_ref());
        Ok(files)
    }

    /// Full analytics document for a project. A project without scans yields
    /// empty series and zero counts.
    #[instrument(skip(self))]
    pub async fn project(&self, user_id: i64, project_id: i64) -> Result<ProjectAnalytics, AnalyticsError> {
        let trend = self.trend(user_id, project_id).await?;
        let latest = self.store.latest_scan(user_id, project_id).await?;
        debug!(scans = trend.len(), latest = ?latest.as_ref().map(|l| l.scan_id), "loaded scan history");

        let (latest_service_rules, latest_noisy_files) = service_rankings(latest.as_ref());
        Ok(ProjectAnalytics {
            project_id,
            trend,
            latest_distribution: distribution(latest.as_ref()),
            latest_service_rules,
            latest_linter_rules: linter_rankings(latest.as_ref()),
            latest_noisy_files,
        })
    }
}

fn distribution(latest: Option<&LatestScan>) -> Distribution {
    latest
        .map(|l| Distribution {
            bugs: l.bugs,
            vulnerabilities: l.vulnerabilities,
            code_smells: l.code_smells,
        })
        .unwrap_or_default()
}

fn service_rankings(latest: Option<&LatestScan>) -> (Vec<RuleBreakdown>, Vec<FileBreakdown>) {
    let Some(json) = latest.and_then(|l| l.issues_json.as_deref()) else {
        return (Vec::new(), Vec::new());
    };
    report::rank_service_issues(json).unwrap_or_else(|e| {
        warn!(error = %e, "stored analysis service issues are unreadable");
        (Vec::new(), Vec::new())
    })
}

fn linter_rankings(latest: Option<&LatestScan>) -> Vec<RuleBreakdown> {
    let Some(xml) = latest.and_then(|l| l.linter_xml.as_deref()) else {
        return Vec::new();
    };
    report::rank_linter_rules(xml).unwrap_or_else(|e| {
        warn!(error = %e, "stored linter report is unreadable");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{LinterCounts, ServiceMetrics};
    use crate::store::SqliteStore;

    const ISSUES: &str = r#"{"issues":[
        {"rule":"kotlin:S1192","component":"proj_1_1:src/a.kt"},
        {"rule":"kotlin:S1192","component":"proj_1_1:src/a.kt"},
        {"rule":"kotlin:S3776","component":"proj_1_1:src/b.kt"}
    ]}"#;
    const REPORT: &str = r#"<checkstyle><file name="a.kt">
        <error severity="warning" source="detekt.MagicNumber"/>
        <error severity="warning" source="detekt.MagicNumber"/>
        <error severity="error" source="detekt.TooManyFunctions"/>
    </file></checkstyle>"#;

    fn metrics() -> ServiceMetrics {
        ServiceMetrics {
            major_issues: 3,
            code_smells: 2,
            bugs: 1,
            vulnerabilities: 4,
            ..Default::default()
        }
    }

    async fn setup() -> (Analytics, Arc<SqliteStore>, i64) {
        let store = Arc::new(SqliteStore::in_memory().await);
        let project = store
            .find_or_create_project(1, "app", "https://github.com/org/app")
            .await
            .unwrap();
        (Analytics::new(store.clone()), store, project.id)
    }

    #[tokio::test]
    async fn test_project_without_scans_is_zero_filled() {
        let (analytics, _store, project_id) = setup().await;
        let result = analytics.project(1, project_id).await.unwrap();
        assert_eq!(
            result,
            ProjectAnalytics {
                project_id,
                ..Default::default()
            }
        );
        assert_eq!(analytics.latest_distribution(1, 999).await.unwrap(), Distribution::default());
    }

    #[tokio::test]
    async fn test_trend_keeps_scans_with_missing_results() {
        let (analytics, store, project_id) = setup().await;
        let counts = LinterCounts {
            warning_issues: 2,
            ..Default::default()
        };

        let s1 = store.create_scan(project_id, 1).await.unwrap();
        store.insert_linter_result(s1.id, REPORT, &counts).await.unwrap();
        let s2 = store.create_scan(project_id, 1).await.unwrap();
        store.insert_service_result(s2.id, ISSUES, &metrics()).await.unwrap();
        let s3 = store.create_scan(project_id, 1).await.unwrap();
        store.insert_linter_result(s3.id, REPORT, &counts).await.unwrap();

        let trend = analytics.trend(1, project_id).await.unwrap();
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[1].scan_id, s2.id);
        assert_eq!(trend[1].total_linter_issues, 0);
        assert_eq!(trend[1].total_service_issues, 3);
        assert_eq!(trend[0].total_service_issues, 0);
    }

    #[tokio::test]
    async fn test_latest_breakdowns_come_from_latest_scan() {
        let (analytics, store, project_id) = setup().await;

        let old = store.create_scan(project_id, 1).await.unwrap();
        store
            .insert_service_result(old.id, r#"{"issues":[{"rule":"old","component":"p:old.kt"}]}"#, &ServiceMetrics::default())
            .await
            .unwrap();
        let new = store.create_scan(project_id, 1).await.unwrap();
        store.insert_service_result(new.id, ISSUES, &metrics()).await.unwrap();
        store
            .insert_linter_result(new.id, REPORT, &LinterCounts::default())
            .await
            .unwrap();

        let result = analytics.project(1, project_id).await.unwrap();
        assert_eq!(
            result.latest_distribution,
            Distribution {
                bugs: 1,
                vulnerabilities: 4,
                code_smells: 2
            }
        );
        assert_eq!(result.latest_service_rules[0].rule_name, "kotlin:S1192");
        assert_eq!(result.latest_service_rules[0].issue_count, 2);
        assert_eq!(result.latest_noisy_files[0].file_name, "src/a.kt");
        assert_eq!(result.latest_noisy_files[1].file_name, "src/b.kt");
        assert_eq!(result.latest_linter_rules[0].rule_name, "MagicNumber");
        assert_eq!(result.latest_linter_rules[1].rule_name, "TooManyFunctions");

        let rankings = analytics.latest_rule_rankings(1, project_id).await.unwrap();
        assert_eq!(rankings.service, result.latest_service_rules);
        assert_eq!(rankings.linter, result.latest_linter_rules);
        assert_eq!(
            analytics.latest_noisy_files(1, project_id).await.unwrap(),
            result.latest_noisy_files
        );
    }

    #[tokio::test]
    async fn test_unreadable_payloads_give_empty_rankings() {
        let (analytics, store, project_id) = setup().await;
        let scan = store.create_scan(project_id, 1).await.unwrap();
        store
            .insert_service_result(scan.id, "not json", &metrics())
            .await
            .unwrap();
        store
            .insert_linter_result(scan.id, "<checkstyle><file", &LinterCounts::default())
            .await
            .unwrap();

        let result = analytics.project(1, project_id).await.unwrap();
        assert!(result.latest_service_rules.is_empty());
        assert!(result.latest_noisy_files.is_empty());
        assert!(result.latest_linter_rules.is_empty());
        assert_eq!(result.latest_distribution.bugs, 1);
    }

    #[tokio::test]
    async fn test_other_users_see_nothing() {
        let (analytics, store, project_id) = setup().await;
        let scan = store.create_scan(project_id, 1).await.unwrap();
        store.insert_service_result(scan.id, ISSUES, &metrics()).await.unwrap();

        let result = analytics.project(2, project_id).await.unwrap();
        assert!(result.trend.is_empty());
        assert!(result.latest_service_rules.is_empty());
    }
}
