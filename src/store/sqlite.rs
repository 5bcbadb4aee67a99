use async_trait::async_trait;
use chrono::{SecondsFormat, SubsecRound, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, instrument};

use super::{LatestScan, Project, ProjectSummary, Scan, ScanSummary, ScanStore, StoreError, TrendPoint};
use crate::report::{LinterCounts, ServiceMetrics};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SCAN_COLUMNS: &str = "id, project_id, user_id, started_at, lines_of_code, maintainability_rating, cognitive_complexity";

/// `ScanStore` backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that is never recycled,
    /// since every new connection would see an empty database.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Self::from_pool(pool).await.unwrap()
    }

    async fn project_exists(&self, user_id: i64, project_id: i64) -> Result<bool, StoreError> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ? AND user_id = ?)",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }
}

#[async_trait]
impl ScanStore for SqliteStore {
    #[instrument(skip(self))]
    async fn find_or_create_project(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Project, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO projects (user_id, name, url) VALUES (?, ?, ?) ON CONFLICT (user_id, url) DO NOTHING",
        )
        .bind(user_id)
        .bind(name)
        .bind(url)
        .execute(&self.pool)
        .await?;
        debug!(created = inserted.rows_affected() > 0, "resolved project");

        let project = sqlx::query_as::<_, Project>(
            "SELECT id, user_id, name, url FROM projects WHERE user_id = ? AND url = ?",
        )
        .bind(user_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    async fn create_scan(&self, project_id: i64, user_id: i64) -> Result<Scan, StoreError> {
        let started_at = Utc::now().trunc_subsecs(6);
        let result = sqlx::query("INSERT INTO scans (project_id, user_id, started_at) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(user_id)
            // Fixed-width text so that ordering by the column is chronological.
            .bind(started_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&self.pool)
            .await?;

        Ok(Scan {
            id: result.last_insert_rowid(),
            project_id,
            user_id,
            started_at,
            lines_of_code: 0,
            maintainability_rating: 0,
            cognitive_complexity: 0,
        })
    }

    async fn get_scan(&self, user_id: i64, scan_id: i64) -> Result<Scan, StoreError> {
        let sql = format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ? AND user_id = ?");
        sqlx::query_as::<_, Scan>(&sql)
            .bind(scan_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("scan {scan_id}")))
    }

    async fn insert_linter_result(
        &self,
        scan_id: i64,
        report_xml: &str,
        counts: &LinterCounts,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO linter_results (scan_id, report_xml, error_issues, warning_issues, info_issues) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(scan_id)
        .bind(report_xml)
        .bind(counts.error_issues)
        .bind(counts.warning_issues)
        .bind(counts.info_issues)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_service_result(
        &self,
        scan_id: i64,
        issues_json: &str,
        metrics: &ServiceMetrics,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO service_results (scan_id, issues_json, blocker_issues, critical_issues, major_issues, minor_issues, info_issues, code_smells, bugs, vulnerabilities) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(scan_id)
        .bind(issues_json)
        .bind(metrics.blocker_issues)
        .bind(metrics.critical_issues)
        .bind(metrics.major_issues)
        .bind(metrics.minor_issues)
        .bind(metrics.info_issues)
        .bind(metrics.code_smells)
        .bind(metrics.bugs)
        .bind(metrics.vulnerabilities)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_scan_metrics(
        &self,
        scan_id: i64,
        metrics: &ServiceMetrics,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE scans SET lines_of_code = ?, maintainability_rating = ?, cognitive_complexity = ? WHERE id = ?",
        )
        .bind(metrics.lines_of_code)
        .bind(metrics.maintainability_rating)
        .bind(metrics.cognitive_complexity)
        .bind(scan_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("scan {scan_id}")));
        }
        Ok(())
    }

    async fn list_projects(&self, user_id: i64) -> Result<Vec<ProjectSummary>, StoreError> {
        let projects = sqlx::query_as::<_, ProjectSummary>(
            r#"
            SELECT p.id, p.name, p.url, MAX(s.started_at) AS last_scan
            FROM projects p
            LEFT JOIN scans s ON s.project_id = p.id
            WHERE p.user_id = ?
            GROUP BY p.id, p.name, p.url
            ORDER BY last_scan IS NULL, last_scan DESC, p.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    async fn list_project_scans(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Vec<ScanSummary>, StoreError> {
        if !self.project_exists(user_id, project_id).await? {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }

        let scans = sqlx::query_as::<_, ScanSummary>(
            r#"
            SELECT
                s.id,
                s.started_at,
                COALESCE(l.error_issues, 0) + COALESCE(l.warning_issues, 0) + COALESCE(l.info_issues, 0)
                    AS linter_issue_count,
                COALESCE(r.blocker_issues, 0) + COALESCE(r.critical_issues, 0) + COALESCE(r.major_issues, 0)
                    + COALESCE(r.minor_issues, 0) + COALESCE(r.info_issues, 0)
                    AS service_issue_count
            FROM scans s
            LEFT JOIN linter_results l ON l.scan_id = s.id
            LEFT JOIN service_results r ON r.scan_id = s.id
            WHERE s.project_id = ? AND s.user_id = ?
            ORDER BY s.started_at DESC, s.id DESC
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(scans)
    }

    async fn linter_report(&self, user_id: i64, scan_id: i64) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT l.report_xml FROM linter_results l JOIN scans s ON s.id = l.scan_id WHERE l.scan_id = ? AND s.user_id = ?",
        )
        .bind(scan_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("linter result for scan {scan_id}")))
    }

    async fn service_issues(&self, user_id: i64, scan_id: i64) -> Result<String, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT r.issues_json FROM service_results r JOIN scans s ON s.id = r.scan_id WHERE r.scan_id = ? AND s.user_id = ?",
        )
        .bind(scan_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("analysis service result for scan {scan_id}")))
    }

    async fn trend(&self, user_id: i64, project_id: i64) -> Result<Vec<TrendPoint>, StoreError> {
        let points = sqlx::query_as::<_, TrendPoint>(
            r#"
            SELECT
                s.id AS scan_id,
                s.started_at,
                s.maintainability_rating,
                s.cognitive_complexity,
                s.lines_of_code,
                COALESCE(l.error_issues, 0) + COALESCE(l.warning_issues, 0) + COALESCE(l.info_issues, 0)
                    AS total_linter_issues,
                COALESCE(r.blocker_issues, 0) + COALESCE(r.critical_issues, 0) + COALESCE(r.major_issues, 0)
                    + COALESCE(r.minor_issues, 0) + COALESCE(r.info_issues, 0)
                    AS total_service_issues,
                COALESCE(r.blocker_issues, 0) AS blocker_issues,
                COALESCE(r.critical_issues, 0) AS critical_issues,
                COALESCE(r.major_issues, 0) AS major_issues
            FROM scans s
            LEFT JOIN linter_results l ON l.scan_id = s.id
            LEFT JOIN service_results r ON r.scan_id = s.id
            WHERE s.project_id = ? AND s.user_id = ?
            ORDER BY s.started_at ASC, s.id ASC
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(points)
    }

    async fn latest_scan(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<Option<LatestScan>, StoreError> {
        let latest = sqlx::query_as::<_, LatestScan>(
            r#"
            SELECT
                s.id AS scan_id,
                r.issues_json,
                l.report_xml AS linter_xml,
                COALESCE(r.bugs, 0) AS bugs,
                COALESCE(r.vulnerabilities, 0) AS vulnerabilities,
                COALESCE(r.code_smells, 0) AS code_smells
            FROM scans s
            LEFT JOIN service_results r ON r.scan_id = s.id
            LEFT JOIN linter_results l ON l.scan_id = s.id
            WHERE s.project_id = ? AND s.user_id = ?
            ORDER BY s.started_at DESC, s.id DESC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(latest)
    }
}
