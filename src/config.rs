use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Config file looked up in the current directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = ".repo-scanner.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .repo-scanner.toml.
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Analysis service connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL the scanner itself uses for API calls.
    pub host_url: String,
    /// Base URL handed to the analysis container, which may see the network differently.
    pub scanner_host_url: String,
    /// Token the analysis container submits with.
    pub token: Option<String>,
    /// Token for API reads. Falls back to `token`.
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub analysis_deadline_secs: u64,
    /// Grace subtracted from the polling reference time to absorb clock drift.
    pub clock_skew_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host_url: "http://localhost:9000".to_string(),
            scanner_host_url: "http://host.docker.internal:9000".to_string(),
            token: None,
            api_token: None,
            request_timeout_secs: 45,
            poll_request_timeout_secs: 20,
            poll_interval_secs: 5,
            analysis_deadline_secs: 90,
            clock_skew_secs: 15,
        }
    }
}

impl ServiceConfig {
    /// Token for API reads: `api_token` if set, otherwise the scanner token.
    pub fn api_token(&self) -> Option<String> {
        match (&self.api_token, &self.token) {
            (Some(api), _) if !api.is_empty() => Some(api.clone()),
            (_, Some(token)) if !token.is_empty() => {
                warn!("no API token set, falling back to the scanner token; reads may be denied");
                Some(token.clone())
            }
            _ => None,
        }
    }
}

/// Container execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub docker_bin: String,
    pub image: String,
    /// Mount point of the per-run working directory inside the container.
    pub mount_target: String,
    /// Report file the image writes into the working directory.
    pub report_file: String,
    /// Upper bound on how long a container may run before it is killed.
    pub wait_timeout_secs: u64,
    /// Timeout for the short runtime calls (create, start, kill).
    pub command_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: "repo-analyzer:latest".to_string(),
            mount_target: "/data".to_string(),
            report_file: "detekt-report.xml".to_string(),
            wait_timeout_secs: 1800,
            command_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://repo-scanner.db?mode=rwc".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .repo-scanner.toml in the current
    /// directory when no path is given. A missing default file yields the defaults;
    /// a missing explicit file is an error. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(default_path)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Override settings from environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SONAR_HOST_URL") {
            self.service.scanner_host_url = v;
        }
        if let Some(v) = lookup("SONAR_API_URL") {
            self.service.host_url = v;
        }
        if let Some(v) = lookup("SONAR_TOKEN") {
            self.service.token = Some(v);
        }
        if let Some(v) = lookup("SONAR_API_TOKEN") {
            self.service.api_token = Some(v);
        }
        if let Some(v) = lookup("REPO_SCANNER_IMAGE") {
            self.executor.image = v;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.host_url, "http://localhost:9000");
        assert_eq!(config.service.request_timeout_secs, 45);
        assert_eq!(config.service.analysis_deadline_secs, 90);
        assert_eq!(config.executor.image, "repo-analyzer:latest");
        assert_eq!(config.executor.report_file, "detekt-report.xml");
        assert!(config.service.token.is_none());
    }

    #[test]
    fn test_parse_partial_config_toml() {
        let toml_str = r#"
[service]
host_url = "http://sonar.internal:9000"
poll_interval_secs = 8

[executor]
image = "analyzer:2"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.host_url, "http://sonar.internal:9000");
        assert_eq!(config.service.poll_interval_secs, 8);
        assert_eq!(config.service.request_timeout_secs, 45);
        assert_eq!(config.executor.image, "analyzer:2");
        assert_eq!(config.executor.docker_bin, "docker");
        assert_eq!(config.database.url, DatabaseConfig::default().url);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SONAR_HOST_URL", "http://sonar:9000"),
            ("SONAR_TOKEN", "scan-token"),
            ("DATABASE_URL", "sqlite::memory:"),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.service.scanner_host_url, "http://sonar:9000");
        assert_eq!(config.service.host_url, "http://localhost:9000");
        assert_eq!(config.service.token.as_deref(), Some("scan-token"));
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn test_api_token_fallback() {
        let mut service = ServiceConfig {
            token: Some("scan".to_string()),
            ..Default::default()
        };
        assert_eq!(service.api_token().as_deref(), Some("scan"));

        service.api_token = Some("api".to_string());
        assert_eq!(service.api_token().as_deref(), Some("api"));

        service.api_token = Some(String::new());
        service.token = None;
        assert!(service.api_token().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.toml");
        fs::write(&path, "[database]\nurl = \"sqlite://x.db\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.database.url, "sqlite://x.db");
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/scanner.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }

    #[test]
    fn test_malformed_config() {
        let result: Result<Config, _> = toml::from_str("[service\nhost_url = 1");
        assert!(result.is_err());
    }
}
