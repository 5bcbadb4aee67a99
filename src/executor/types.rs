use std::path::PathBuf;

/// Everything needed to create one analysis container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// `KEY=value` pairs injected into the container environment
    pub env: Vec<(String, String)>,
    /// Host directory bound into the container
    pub mount_source: PathBuf,
    pub mount_target: String,
    /// Remove the container as soon as it exits
    pub auto_remove: bool,
}

impl ContainerSpec {
    #[cfg(test)]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw results of one executor run. `None` marks a piece that could not be obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanArtifacts {
    /// Linter report read back from the working directory
    pub linter_report: Option<String>,
    /// Issue search JSON from the analysis service
    pub issues_json: Option<String>,
    /// Measures JSON from the analysis service
    pub measures_json: Option<String>,
}
