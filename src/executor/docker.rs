use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::types::ContainerSpec;
use super::{ContainerRuntime, ExecutorError};
use crate::config::ExecutorConfig;

/// Drives containers through the `docker` command line client.
pub struct DockerCli {
    bin: String,
    command_timeout: Duration,
}

impl DockerCli {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            bin: config.docker_bin.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Run one docker subcommand and return its trimmed stdout.
    ///
    /// Non-zero exits become `ExecutorError::Runtime` carrying stderr.
    async fn run(
        &self,
        action: &'static str,
        args: &[String],
        limit: Option<Duration>,
    ) -> Result<String, ExecutorError> {
        debug!(action, bin = %self.bin, "running container runtime command");
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match limit {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| ExecutorError::CommandTimeout {
                    action,
                    waited: limit,
                })?,
            None => output.await,
        }
        .map_err(|e| ExecutorError::Runtime {
            action,
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(ExecutorError::Runtime {
                action,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Arguments for `docker create` from a spec.
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    for (key, value) in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push("--mount".to_string());
    args.push(format!(
        "type=bind,source={},target={}",
        spec.mount_source.display(),
        spec.mount_target
    ));
    args.push(spec.image.clone());
    args
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, stream: &'static str) {
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "repo_scanner::container", stream, "{line}");
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ExecutorError> {
        let id = self
            .run("create", &create_args(spec), Some(self.command_timeout))
            .await?;
        if id.is_empty() {
            return Err(ExecutorError::Runtime {
                action: "create",
                reason: "runtime returned no container id".to_string(),
            });
        }
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<(), ExecutorError> {
        self.run(
            "start",
            &["start".to_string(), container_id.to_string()],
            Some(self.command_timeout),
        )
        .await
        .map(|_| ())
    }

    async fn drain_logs(&self, container_id: &str) -> Result<(), ExecutorError> {
        let mut child = Command::new(&self.bin)
            .args(["logs", "--follow", container_id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Runtime {
                action: "logs",
                reason: e.to_string(),
            })?;

        tokio::join!(
            forward_lines(child.stdout.take(), "stdout"),
            forward_lines(child.stderr.take(), "stderr"),
        );
        child.wait().await.map_err(|e| ExecutorError::Runtime {
            action: "logs",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn wait(&self, container_id: &str) -> Result<i64, ExecutorError> {
        let out = self
            .run("wait", &["wait".to_string(), container_id.to_string()], None)
            .await
            .map_err(|e| ExecutorError::Wait(e.to_string()))?;
        out.lines()
            .last()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .ok_or_else(|| ExecutorError::Wait(format!("unexpected wait output: {out:?}")))
    }

    async fn kill(&self, container_id: &str) -> Result<(), ExecutorError> {
        self.run(
            "kill",
            &["kill".to_string(), container_id.to_string()],
            Some(self.command_timeout),
        )
        .await
        .map(|_| ())
    }
}
