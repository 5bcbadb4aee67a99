pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::{LatestScan, Project, ProjectSummary, Scan, ScanSummary, TrendPoint};

use async_trait::async_trait;
use thiserror::Error;

use crate::report::{LinterCounts, ServiceMetrics};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{0} not found")]
    NotFound(String),
}

/// Persistence for projects, scans and their results.
///
/// Every read is scoped to the owning user. Result rows are write-once: a
/// second insert for the same scan fails.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Return the user's project for `url`, creating it on first use.
    async fn find_or_create_project(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Project, StoreError>;

    /// Insert a scan row stamped with the current time.
    async fn create_scan(&self, project_id: i64, user_id: i64) -> Result<Scan, StoreError>;

    async fn get_scan(&self, user_id: i64, scan_id: i64) -> Result<Scan, StoreError>;

    async fn insert_linter_result(
        &self,
        scan_id: i64,
        report_xml: &str,
        counts: &LinterCounts,
    ) -> Result<(), StoreError>;

    async fn insert_service_result(
        &self,
        scan_id: i64,
        issues_json: &str,
        metrics: &ServiceMetrics,
    ) -> Result<(), StoreError>;

    /// Fill in the scan's lines of code, rating and complexity.
    async fn update_scan_metrics(
        &self,
        scan_id: i64,
        metrics: &ServiceMetrics,
    ) -> Result<(), StoreError>;

    /// Projects ordered by last scan, most recent first, never-scanned last.
    async fn list_projects(&self, user_id: i64) -> Result<Vec<ProjectSummary>, StoreError>;

    /// Scans of one project, newest first. `NotFound` if the user does not own it.
    async fn list_project_scans(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Vec<ScanSummary>, StoreError>;

    /// Raw linter report stored for a scan.
    async fn linter_report(&self, user_id: i64, scan_id: i64) -> Result<String, StoreError>;

    /// Raw analysis service issues stored for a scan.
    async fn service_issues(&self, user_id: i64, scan_id: i64) -> Result<String, StoreError>;

    /// One point per scan of the project, oldest first.
    async fn trend(&self, user_id: i64, project_id: i64) -> Result<Vec<TrendPoint>, StoreError>;

    async fn latest_scan(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Option<LatestScan>, StoreError>;
}
