pub mod types;

pub use types::Endpoint;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::ServiceConfig;
use types::{AnalysesResponse, ISSUES_QUERY, MEASURE_KEYS};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Invalid analysis service URL: {0}")]
    InvalidUrl(String),

    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {endpoint} failed with status {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: StatusCode,
        body: String,
    },

    #[error("Unreadable response from {endpoint}: {source}")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out after {waited:?} waiting for a new analysis of {component}")]
    AnalysisTimeout { component: String, waited: Duration },
}

/// The analysis service as seen by the scan executor.
///
/// Implementations must be Send + Sync so the executor can share one behind an Arc.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Raw JSON from the issue search endpoint.
    async fn fetch_issues(&self, component_key: &str) -> Result<String, ServiceError>;

    /// Raw JSON from the component measures endpoint.
    async fn fetch_measures(&self, component_key: &str) -> Result<String, ServiceError>;

    /// Block until the service reports an analysis newer than the moment polling
    /// started, or fail with `AnalysisTimeout` once `deadline` has elapsed.
    /// Transport errors while polling are retried, never returned.
    async fn wait_for_analysis(&self, component_key: &str, deadline: Duration)
        -> Result<(), ServiceError>;
}

/// HTTP client for a SonarQube-compatible analysis service.
pub struct SonarClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    poll_interval: Duration,
    poll_request_timeout: Duration,
    clock_skew: chrono::Duration,
}

impl SonarClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("repo-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ServiceError::Client)?;

        let token = config.api_token();
        if token.is_none() {
            warn!("no analysis service token configured, requests are sent without authentication");
        }

        Ok(Self {
            http,
            base_url: config.host_url.trim_end_matches('/').to_string(),
            token,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            poll_request_timeout: Duration::from_secs(config.poll_request_timeout_secs),
            clock_skew: chrono::Duration::seconds(config.clock_skew_secs as i64),
        })
    }

    /// Build the full URL for an endpoint and component key.
    pub fn endpoint_url(&self, endpoint: Endpoint, component_key: &str) -> Result<Url, ServiceError> {
        let base = format!("{}/{}", self.base_url, endpoint.path());
        let url = match endpoint {
            Endpoint::IssuesSearch => {
                let mut url = Url::parse_with_params(&base, &[("componentKeys", component_key)])
                    .map_err(|e| ServiceError::InvalidUrl(format!("{base}: {e}")))?;
                let query = format!("{}&{}", url.query().unwrap_or_default(), ISSUES_QUERY);
                url.set_query(Some(&query));
                url
            }
            Endpoint::MeasuresComponent => Url::parse_with_params(
                &base,
                &[
                    ("component", component_key),
                    ("metricKeys", &MEASURE_KEYS.join(",")),
                ],
            )
            .map_err(|e| ServiceError::InvalidUrl(format!("{base}: {e}")))?,
            Endpoint::ProjectAnalyses => {
                Url::parse_with_params(&base, &[("project", component_key), ("ps", "1")])
                    .map_err(|e| ServiceError::InvalidUrl(format!("{base}: {e}")))?
            }
        };
        Ok(url)
    }

    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.get(url);
        match &self.token {
            Some(token) => builder.basic_auth(token, Some("")),
            None => builder,
        }
    }

    async fn get_text(
        &self,
        endpoint: Endpoint,
        component_key: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ServiceError> {
        let url = self.endpoint_url(endpoint, component_key)?;
        let mut builder = self.request(url);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| ServiceError::Transport { endpoint, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ServiceError::Transport { endpoint, source })?;

        if !status.is_success() {
            return Err(ServiceError::Status {
                endpoint,
                status,
                body,
            });
        }
        debug!(%endpoint, bytes = body.len(), "received analysis service response");
        Ok(body)
    }

    /// Date of the latest analysis the service knows for the component.
    async fn latest_analysis(&self, component_key: &str) -> Result<Option<DateTime<Utc>>, ServiceError> {
        let endpoint = Endpoint::ProjectAnalyses;
        let body = self
            .get_text(endpoint, component_key, Some(self.poll_request_timeout))
            .await?;
        let response: AnalysesResponse = serde_json::from_str(&body)
            .map_err(|source| ServiceError::Decode { endpoint, source })?;
        Ok(response.latest_date())
    }
}

#[async_trait]
impl AnalysisService for SonarClient {
    #[instrument(skip(self))]
    async fn fetch_issues(&self, component_key: &str) -> Result<String, ServiceError> {
        self.get_text(Endpoint::IssuesSearch, component_key, None).await
    }

    #[instrument(skip(self))]
    async fn fetch_measures(&self, component_key: &str) -> Result<String, ServiceError> {
        self.get_text(Endpoint::MeasuresComponent, component_key, None).await
    }

    #[instrument(skip(self))]
    async fn wait_for_analysis(
        &self,
        component_key: &str,
        deadline: Duration,
    ) -> Result<(), ServiceError> {
        let started = Instant::now();
        let expires = started + deadline;
        let reference = Utc::now() - self.clock_skew;

        loop {
            match self.latest_analysis(component_key).await {
                Ok(Some(date)) if date > reference => {
                    info!(analysis_date = %date, "new analysis detected");
                    return Ok(());
                }
                Ok(latest) => debug!(?latest, "no new analysis yet"),
                Err(e) => warn!(error = %e, "polling analysis service failed, retrying"),
            }

            let now = Instant::now();
            if now >= expires {
                return Err(ServiceError::AnalysisTimeout {
                    component: component_key.to_string(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(self.poll_interval.min(expires - now)).await;
        }
    }
}
