pub mod docker;
pub mod types;

pub use docker::DockerCli;
pub use types::{ContainerSpec, ScanArtifacts};

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::config::Config;
use crate::sonar::AnalysisService;

/// How long the log drain may keep running after the container has exited.
const LOG_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to prepare working directory: {0}")]
    WorkDir(#[source] std::io::Error),

    #[error("Container {action} failed: {reason}")]
    Runtime { action: &'static str, reason: String },

    #[error("Container {action} did not finish within {waited:?}")]
    CommandTimeout {
        action: &'static str,
        waited: Duration,
    },

    #[error("Container execution error: {0}")]
    Wait(String),

    #[error("Analysis container {container} exited with non-zero status: {code}")]
    NonZeroExit { container: String, code: i64 },

    #[error("Analysis container {container} still running after {waited:?}, killed")]
    WaitTimeout { container: String, waited: Duration },
}

/// A container engine able to run one analysis container.
///
/// Implementations must be Send + Sync; the log drain runs on its own task.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create the container and return its id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ExecutorError>;

    async fn start(&self, container_id: &str) -> Result<(), ExecutorError>;

    /// Forward the container's console output to the log until it ends.
    async fn drain_logs(&self, container_id: &str) -> Result<(), ExecutorError>;

    /// Wait until the container stops and return its exit status.
    async fn wait(&self, container_id: &str) -> Result<i64, ExecutorError>;

    async fn kill(&self, container_id: &str) -> Result<(), ExecutorError>;
}

/// Runs the analysis container for one repository and gathers every result it leads to.
pub struct ScanExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    service: Arc<dyn AnalysisService>,
    image: String,
    mount_target: String,
    report_file: String,
    scanner_host_url: String,
    scanner_token: String,
    wait_timeout: Duration,
    analysis_deadline: Duration,
}

impl ScanExecutor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        service: Arc<dyn AnalysisService>,
        config: &Config,
    ) -> Self {
        Self {
            runtime,
            service,
            image: config.executor.image.clone(),
            mount_target: config.executor.mount_target.clone(),
            report_file: config.executor.report_file.clone(),
            scanner_host_url: config.service.scanner_host_url.clone(),
            scanner_token: config.service.token.clone().unwrap_or_default(),
            wait_timeout: Duration::from_secs(config.executor.wait_timeout_secs),
            analysis_deadline: Duration::from_secs(config.service.analysis_deadline_secs),
        }
    }

    /// Run the analysis container for `repo_url` and collect the linter report
    /// and the analysis service results for `component_key`.
    ///
    /// Fails only if the container cannot be run to a successful exit. A missing
    /// report or an unavailable service result comes back as `None`.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        repo_url: &str,
        component_key: &str,
    ) -> Result<ScanArtifacts, ExecutorError> {
        // Removed on drop, whichever way this function exits.
        let workdir = tempfile::Builder::new()
            .prefix("scan-")
            .tempdir()
            .map_err(ExecutorError::WorkDir)?;

        let spec = self.container_spec(repo_url, component_key, workdir.path());
        info!(image = %spec.image, "starting analysis container");
        let container_id = self.runtime.create(&spec).await?;
        let short = short_id(&container_id).to_string();
        self.runtime.start(&container_id).await?;

        let mut drain = {
            let runtime = Arc::clone(&self.runtime);
            let id = container_id.clone();
            tokio::spawn(
                async move {
                    if let Err(e) = runtime.drain_logs(&id).await {
                        warn!(error = %e, "could not follow container logs");
                    }
                }
                .instrument(info_span!("container_logs", container = %short)),
            )
        };

        info!(container = %short, "analysis container started, waiting for completion");
        let exit = self.await_exit(&container_id).await;
        if tokio::time::timeout(LOG_DRAIN_GRACE, &mut drain).await.is_err() {
            drain.abort();
        }
        exit?;
        info!(container = %short, "analysis container finished successfully");

        let linter_report = self.read_report(workdir.path()).await;

        if let Err(e) = self
            .service
            .wait_for_analysis(component_key, self.analysis_deadline)
            .await
        {
            warn!(error = %e, "analysis not confirmed, fetching whatever is available");
        }

        let (issues, measures) = tokio::join!(
            self.service.fetch_issues(component_key),
            self.service.fetch_measures(component_key),
        );
        let issues_json = issues
            .inspect_err(|e| warn!(error = %e, "could not fetch analysis service issues"))
            .ok();
        let measures_json = measures
            .inspect_err(|e| warn!(error = %e, "could not fetch analysis service measures"))
            .ok();

        if let Err(e) = workdir.close() {
            warn!(error = %e, "could not remove working directory");
        }

        Ok(ScanArtifacts {
            linter_report,
            issues_json,
            measures_json,
        })
    }

    fn container_spec(&self, repo_url: &str, component_key: &str, workdir: &Path) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            env: vec![
                ("REPO_URL".to_string(), repo_url.to_string()),
                ("SONAR_PROJECT_KEY".to_string(), component_key.to_string()),
                ("SONAR_HOST_URL".to_string(), self.scanner_host_url.clone()),
                ("SONAR_TOKEN".to_string(), self.scanner_token.clone()),
            ],
            mount_source: workdir.to_path_buf(),
            mount_target: self.mount_target.clone(),
            auto_remove: true,
        }
    }

    /// Wait for the container to stop, or kill it once the wait timeout passes.
    async fn await_exit(&self, container_id: &str) -> Result<(), ExecutorError> {
        tokio::select! {
            status = self.runtime.wait(container_id) => {
                let code = status?;
                if code != 0 {
                    return Err(ExecutorError::NonZeroExit {
                        container: short_id(container_id).to_string(),
                        code,
                    });
                }
                Ok(())
            }
            _ = tokio::time::sleep(self.wait_timeout) => {
                warn!(container = %short_id(container_id), "analysis container timed out, killing it");
                if let Err(e) = self.runtime.kill(container_id).await {
                    warn!(error = %e, "could not kill analysis container");
                }
                Err(ExecutorError::WaitTimeout {
                    container: short_id(container_id).to_string(),
                    waited: self.wait_timeout,
                })
            }
        }
    }

    async fn read_report(&self, workdir: &Path) -> Option<String> {
        let path = workdir.join(&self.report_file);
        match tokio::fs::read_to_string(&path).await {
            Ok(report) if !report.trim().is_empty() => Some(report),
            Ok(_) => {
                warn!(path = %path.display(), "linter report is empty");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read linter report");
                None
            }
        }
    }
}

fn short_id(container_id: &str) -> &str {
    container_id.get(..12).unwrap_or(container_id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sonar::{Endpoint, ServiceError};
    use reqwest::StatusCode;
    use std::sync::Mutex;

    pub const REPORT: &str = r#"<checkstyle version="4.3"><file name="A.kt"><error severity="warning" source="detekt.MagicNumber"/></file></checkstyle>"#;
    pub const ISSUES: &str = r#"{"issues":[{"rule":"kotlin:S1192","component":"proj:src/A.kt"}]}"#;
    pub const MEASURES: &str = r#"{"component":{"measures":[{"metric":"ncloc","value":"120"},{"metric":"sqale_rating","value":"A"},{"metric":"blocker_violations","value":"1"}]}}"#;

    /// Runtime that plays the analysis image: on wait it writes `report` into the
    /// bound directory and returns `exit_code`.
    pub struct ScriptedRuntime {
        pub exit_code: i64,
        pub report: Option<&'static str>,
        pub hang: bool,
        /// Log stream that never ends, like `logs --follow` on a stuck runtime
        pub endless_logs: bool,
        pub specs: Mutex<Vec<ContainerSpec>>,
        pub killed: Mutex<bool>,
    }

    impl ScriptedRuntime {
        pub fn exiting(exit_code: i64, report: Option<&'static str>) -> Self {
            Self {
                exit_code,
                report,
                hang: false,
                endless_logs: false,
                specs: Mutex::new(Vec::new()),
                killed: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        async fn create(&self, spec: &ContainerSpec) -> Result<String, ExecutorError> {
            self.specs.lock().unwrap().push(spec.clone());
            Ok("0123456789abcdef0123".to_string())
        }

        async fn start(&self, _container_id: &str) -> Result<(), ExecutorError> {
            Ok(())
        }

        async fn drain_logs(&self, _container_id: &str) -> Result<(), ExecutorError> {
            if self.endless_logs {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn wait(&self, _container_id: &str) -> Result<i64, ExecutorError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(report) = self.report {
                let spec = self.specs.lock().unwrap().last().cloned().unwrap();
                std::fs::write(spec.mount_source.join("detekt-report.xml"), report).unwrap();
            }
            Ok(self.exit_code)
        }

        async fn kill(&self, _container_id: &str) -> Result<(), ExecutorError> {
            *self.killed.lock().unwrap() = true;
            Ok(())
        }
    }

    /// Analysis service with canned answers that records which calls were made.
    pub struct FakeService {
        pub analysis_ready: bool,
        pub issues: Option<&'static str>,
        pub measures: Option<&'static str>,
        pub calls: Mutex<Vec<&'static str>>,
    }

    impl FakeService {
        pub fn answering(issues: Option<&'static str>, measures: Option<&'static str>) -> Self {
            Self {
                analysis_ready: true,
                issues,
                measures,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn answer(endpoint: Endpoint, body: Option<&'static str>) -> Result<String, ServiceError> {
            body.map(str::to_string).ok_or(ServiceError::Status {
                endpoint,
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "unavailable".to_string(),
            })
        }
    }

    #[async_trait]
    impl AnalysisService for FakeService {
        async fn fetch_issues(&self, _component_key: &str) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push("issues");
            Self::answer(Endpoint::IssuesSearch, self.issues)
        }

        async fn fetch_measures(&self, _component_key: &str) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push("measures");
            Self::answer(Endpoint::MeasuresComponent, self.measures)
        }

        async fn wait_for_analysis(
            &self,
            component_key: &str,
            deadline: Duration,
        ) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push("wait");
            if self.analysis_ready {
                Ok(())
            } else {
                Err(ServiceError::AnalysisTimeout {
                    component: component_key.to_string(),
                    waited: deadline,
                })
            }
        }
    }

    fn executor(runtime: Arc<ScriptedRuntime>, service: Arc<FakeService>) -> ScanExecutor {
        let mut config = Config::default();
        config.service.token = Some("scan-token".to_string());
        ScanExecutor::new(runtime, service, &config)
    }

    #[tokio::test]
    async fn test_run_collects_every_artifact() {
        let runtime = Arc::new(ScriptedRuntime::exiting(0, Some(REPORT)));
        let service = Arc::new(FakeService::answering(Some(ISSUES), Some(MEASURES)));

        let artifacts = executor(runtime.clone(), service.clone())
            .run("https://github.com/org/app.git", "proj_1_2")
            .await
            .unwrap();

        assert_eq!(artifacts.linter_report.as_deref(), Some(REPORT));
        assert_eq!(artifacts.issues_json.as_deref(), Some(ISSUES));
        assert_eq!(artifacts.measures_json.as_deref(), Some(MEASURES));

        let specs = runtime.specs.lock().unwrap();
        let spec = &specs[0];
        assert_eq!(spec.image, "repo-analyzer:latest");
        assert_eq!(spec.mount_target, "/data");
        assert!(spec.auto_remove);
        assert_eq!(spec.env_value("REPO_URL"), Some("https://github.com/org/app.git"));
        assert_eq!(spec.env_value("SONAR_PROJECT_KEY"), Some("proj_1_2"));
        assert_eq!(spec.env_value("SONAR_HOST_URL"), Some("http://host.docker.internal:9000"));
        assert_eq!(spec.env_value("SONAR_TOKEN"), Some("scan-token"));
        assert!(!spec.mount_source.exists(), "working directory must be removed");

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls[0], "wait");
        assert!(calls.contains(&"issues") && calls.contains(&"measures"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_fatal_and_skips_service() {
        let runtime = Arc::new(ScriptedRuntime::exiting(1, Some(REPORT)));
        let service = Arc::new(FakeService::answering(Some(ISSUES), Some(MEASURES)));

        let result = executor(runtime.clone(), service.clone())
            .run("https://github.com/org/app", "proj_1_2")
            .await;

        assert!(matches!(result, Err(ExecutorError::NonZeroExit { code: 1, .. })));
        assert!(service.calls.lock().unwrap().is_empty());
        assert!(!runtime.specs.lock().unwrap()[0].mount_source.exists());
    }

    #[tokio::test]
    async fn test_missing_report_still_fetches_service_results() {
        let runtime = Arc::new(ScriptedRuntime::exiting(0, None));
        let service = Arc::new(FakeService::answering(Some(ISSUES), Some(MEASURES)));

        let artifacts = executor(runtime, service)
            .run("https://github.com/org/app", "proj_1_2")
            .await
            .unwrap();

        assert!(artifacts.linter_report.is_none());
        assert!(artifacts.issues_json.is_some());
        assert!(artifacts.measures_json.is_some());
    }

    #[tokio::test]
    async fn test_empty_report_counts_as_missing() {
        let runtime = Arc::new(ScriptedRuntime::exiting(0, Some("  \n")));
        let service = Arc::new(FakeService::answering(None, None));

        let artifacts = executor(runtime, service)
            .run("https://github.com/org/app", "proj_1_2")
            .await
            .unwrap();
        assert_eq!(artifacts, ScanArtifacts::default());
    }

    #[tokio::test]
    async fn test_partial_service_failure_keeps_other_result() {
        let runtime = Arc::new(ScriptedRuntime::exiting(0, Some(REPORT)));
        let mut service = FakeService::answering(None, Some(MEASURES));
        service.analysis_ready = false;
        let service = Arc::new(service);

        let artifacts = executor(runtime, service.clone())
            .run("https://github.com/org/app", "proj_1_2")
            .await
            .unwrap();

        assert!(artifacts.linter_report.is_some());
        assert!(artifacts.issues_json.is_none());
        assert_eq!(artifacts.measures_json.as_deref(), Some(MEASURES));
        assert_eq!(service.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_hung_container_is_killed() {
        let mut runtime = ScriptedRuntime::exiting(0, Some(REPORT));
        runtime.hang = true;
        let runtime = Arc::new(runtime);
        let service = Arc::new(FakeService::answering(Some(ISSUES), Some(MEASURES)));

        let mut executor = executor(runtime.clone(), service.clone());
        executor.wait_timeout = Duration::from_millis(50);

        let result = executor.run("https://github.com/org/app", "proj_1_2").await;
        assert!(matches!(result, Err(ExecutorError::WaitTimeout { .. })));
        assert!(*runtime.killed.lock().unwrap());
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_endless_logs_do_not_block_completion() {
        let mut runtime = ScriptedRuntime::exiting(0, Some(REPORT));
        runtime.endless_logs = true;
        let service = Arc::new(FakeService::answering(Some(ISSUES), Some(MEASURES)));

        let executor = executor(Arc::new(runtime), service);
        let run = executor.run("https://github.com/org/app", "proj_1_2");
        let artifacts = tokio::time::timeout(LOG_DRAIN_GRACE * 5, run)
            .await
            .expect("run must not wait for the log stream")
            .unwrap();
        assert_eq!(artifacts.linter_report.as_deref(), Some(REPORT));
        assert!(artifacts.issues_json.is_some());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
