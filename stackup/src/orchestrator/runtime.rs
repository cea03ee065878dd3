//! The container runtime seam and its `docker compose` implementation.

use crate::cancellation::CancellationToken;
use crate::compose::project_directory;
use crate::errors::BuildStepFailedError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Upper bound for `compose build`.
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Upper bound for `compose up -d`.
pub const UP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Operations the orchestrator needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Builds or pulls images for `services` (all services when empty).
    async fn build(&self, compose_file: &Path, services: &[String]) -> Result<(), BuildStepFailedError>;

    /// Starts `services` detached (all services when empty).
    async fn up(&self, compose_file: &Path, services: &[String]) -> Result<(), BuildStepFailedError>;

    /// Streams logs until `cancel` fires or the stream ends.
    async fn follow_logs(
        &self,
        compose_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BuildStepFailedError>;
}

/// `docker compose` driven through `tokio::process`.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: String,
    project_name: Option<String>,
    build_timeout: Duration,
    up_timeout: Duration,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            project_name: None,
            build_timeout: BUILD_TIMEOUT,
            up_timeout: UP_TIMEOUT,
        }
    }
}

impl DockerCompose {
    /// Creates a runtime that invokes `docker compose`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compose project name.
    #[must_use]
    pub fn with_project_name(mut self, name: Option<String>) -> Self {
        self.project_name = name;
        self
    }

    /// Uses another executable in place of `docker`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for one `compose` subcommand.
    ///
    /// The project directory is always passed, so relative build contexts,
    /// volumes and `.env` resolve against the overlay directory rather than
    /// the render directory.
    #[must_use]
    pub fn compose_args(&self, compose_file: &Path, subcommand: &[&str], services: &[String]) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            compose_file.to_string_lossy().into_owned(),
            "--project-directory".to_string(),
            project_directory(compose_file).to_string_lossy().into_owned(),
        ];
        if let Some(project) = &self.project_name {
            args.push("-p".to_string());
            args.push(project.clone());
        }
        args.extend(subcommand.iter().map(|s| (*s).to_string()));
        args.extend(services.iter().cloned());
        args
    }

    async fn run(&self, step: &str, args: Vec<String>, limit: Duration) -> Result<(), BuildStepFailedError> {
        debug!(step, program = %self.program, ?args, "Running container runtime command");
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(limit, status).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(BuildStepFailedError::new(step, format!("exited with {status}"))),
            Ok(Err(e)) => Err(BuildStepFailedError::new(
                step,
                format!("cannot run '{}': {e}", self.program),
            )),
            Err(_) => Err(BuildStepFailedError::new(
                step,
                format!("timed out after {}s", limit.as_secs()),
            )),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn build(&self, compose_file: &Path, services: &[String]) -> Result<(), BuildStepFailedError> {
        let args = self.compose_args(compose_file, &["build"], services);
        self.run("compose build", args, self.build_timeout).await
    }

    async fn up(&self, compose_file: &Path, services: &[String]) -> Result<(), BuildStepFailedError> {
        let args = self.compose_args(compose_file, &["up", "-d"], services);
        self.run("compose up", args, self.up_timeout).await
    }

    async fn follow_logs(
        &self,
        compose_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BuildStepFailedError> {
        let args = self.compose_args(compose_file, &["logs", "-f"], &[]);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildStepFailedError::new("compose logs", e.to_string()))?;

        tokio::select! {
            status = child.wait() => {
                status.map_err(|e| BuildStepFailedError::new("compose logs", e.to_string()))?;
                Ok(())
            }
            () = cancel.cancelled() => {
                info!("Stopped following logs");
                child
                    .kill()
                    .await
                    .map_err(|e| BuildStepFailedError::new("compose logs", e.to_string()))
            }
        }
    }
}
