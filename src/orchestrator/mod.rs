use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use crate::executor::{ExecutorError, ScanArtifacts, ScanExecutor};
use crate::report::{self, LinterCounts, ServiceMetrics};
use crate::store::{ScanStore, StoreError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Could not save project: {0}")]
    Project(#[source] StoreError),

    #[error("Could not create scan: {0}")]
    CreateScan(#[source] StoreError),

    #[error("Analysis failed for scan {scan_id}: {source}")]
    Execution {
        scan_id: i64,
        #[source]
        source: ExecutorError,
    },
}

/// What a completed scan produced. Missing results mean degraded completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scan_id: i64,
    pub project_id: i64,
    /// Linter counts, if a report was produced, parsed and stored
    pub linter: Option<LinterCounts>,
    /// Analysis service metrics, if both payloads were produced and parsed
    pub service: Option<ServiceMetrics>,
}

/// Sequences one scan request: project and scan rows, container run,
/// normalization and persistence of whatever results materialized.
pub struct ScanOrchestrator {
    store: Arc<dyn ScanStore>,
    executor: ScanExecutor,
}

impl ScanOrchestrator {
    pub fn new(store: Arc<dyn ScanStore>, executor: ScanExecutor) -> Self {
        Self { store, executor }
    }

    /// Run a scan of `repo_url` for `user_id`.
    ///
    /// Fails for invalid input, when the project or scan row cannot be written,
    /// or when the analysis container does not complete. Every later problem is
    /// logged and leaves the corresponding result out of the outcome.
    pub async fn run_scan(
        &self,
        user_id: i64,
        repo_url: &str,
    ) -> Result<ScanOutcome, OrchestratorError> {
        let repo_url = repo_url.trim();
        if repo_url.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "repository URL is required".to_string(),
            ));
        }
        if repo_url.chars().any(char::is_whitespace) {
            return Err(OrchestratorError::InvalidInput(format!(
                "repository URL contains whitespace: {repo_url:?}"
            )));
        }

        let project = self
            .store
            .find_or_create_project(user_id, project_name(repo_url), repo_url)
            .await
            .map_err(OrchestratorError::Project)?;

        let scan = self
            .store
            .create_scan(project.id, user_id)
            .await
            .map_err(OrchestratorError::CreateScan)?;

        let span = info_span!("scan", scan_id = scan.id, project_id = project.id);
        async move {
            info!(repo_url = %repo_url, "scan started");

            let artifacts = self
                .executor
                .run(repo_url, &project.component_key())
                .await
                .map_err(|source| {
                    error!(error = %source, "analysis run failed");
                    OrchestratorError::Execution {
                        scan_id: scan.id,
                        source,
                    }
                })?;

            let outcome = self.persist(scan.id, project.id, artifacts).await;
            info!(
                linter = outcome.linter.is_some(),
                service = outcome.service.is_some(),
                "scan finished"
            );
            Ok::<_, OrchestratorError>(outcome)
        }
        .instrument(span)
        .await
    }

    async fn persist(&self, scan_id: i64, project_id: i64, artifacts: ScanArtifacts) -> ScanOutcome {
        let linter = match &artifacts.linter_report {
            Some(xml) => self.persist_linter(scan_id, xml).await,
            None => {
                warn!("no linter report produced");
                None
            }
        };

        let service = match (&artifacts.issues_json, &artifacts.measures_json) {
            (Some(issues), Some(measures)) => self.persist_service(scan_id, issues, measures).await,
            _ => {
                warn!("analysis service results incomplete, skipping");
                None
            }
        };

        ScanOutcome {
            scan_id,
            project_id,
            linter,
            service,
        }
    }

    async fn persist_linter(&self, scan_id: i64, xml: &str) -> Option<LinterCounts> {
        let counts = match report::parse_linter_report(xml) {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "failed to parse linter report");
                return None;
            }
        };
        if let Err(e) = self.store.insert_linter_result(scan_id, xml, &counts).await {
            warn!(error = %e, "failed to store linter result");
            return None;
        }
        Some(counts)
    }

    async fn persist_service(
        &self,
        scan_id: i64,
        issues: &str,
        measures: &str,
    ) -> Option<ServiceMetrics> {
        let metrics = match report::parse_measures(measures) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "failed to parse analysis service measures");
                return None;
            }
        };

        let stored = self.store.insert_service_result(scan_id, issues, &metrics).await;
        if let Err(e) = &stored {
            warn!(error = %e, "failed to store analysis service result");
        }
        if let Err(e) = self.store.update_scan_metrics(scan_id, &metrics).await {
            warn!(error = %e, "failed to update scan metrics");
        }
        stored.ok().map(|_| metrics)
    }
}

/// Display name of a repository: its last path segment without `.git`.
pub fn project_name(repo_url: &str) -> &str {
    let trimmed = repo_url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    match trimmed.rsplit(|c: char| c == '/' || c == ':').next() {
        Some(name) if !name.is_empty() => name,
        _ => trimmed,
    }
}
