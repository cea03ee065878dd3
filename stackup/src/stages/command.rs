//! Real stages backed by an external build command.

use super::{Stage, StageContext};
use crate::core::StageOutput;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tracing::{debug, warn};

/// A stage that runs one command and checks it left its artifact behind.
#[derive(Debug, Clone)]
pub struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    produces: Option<PathBuf>,
}

impl CommandStage {
    /// Creates a command stage.
    ///
    /// Arguments may contain `{staging}` and `{source}` placeholders.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            workdir: None,
            produces: None,
        }
    }

    /// Runs the command in a directory relative to the source root.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Declares the artifact path, relative to the staging root.
    #[must_use]
    pub fn producing(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces = Some(path.into());
        self
    }

    /// Arguments with every placeholder expanded for `ctx`.
    #[must_use]
    pub fn expanded_args(&self, ctx: &StageContext) -> Vec<String> {
        self.args.iter().map(|a| ctx.expand(a)).collect()
    }

    /// The command line as it runs under `ctx`, for logs and errors.
    #[must_use]
    pub fn command_line(&self, ctx: &StageContext) -> String {
        std::iter::once(self.program.clone())
            .chain(self.expanded_args(ctx))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let start = Instant::now();
        let workdir = match &self.workdir {
            Some(dir) => ctx.source_root().join(dir),
            None => ctx.source_root().to_path_buf(),
        };
        let args = self.expanded_args(ctx);

        debug!(stage = %self.name, program = %self.program, ?args, workdir = %workdir.display(), "Running build command");

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&args)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let status = match tokio::time::timeout(ctx.timeout(), cmd.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return StageOutput::fail(format!("failed to start '{}': {e}", self.program))
                    .with_duration_ms(elapsed_ms(start));
            }
            Err(_) => {
                warn!(stage = %self.name, timeout_secs = ctx.timeout().as_secs(), "Build command timed out");
                return StageOutput::fail(format!(
                    "'{}' timed out after {}s",
                    self.command_line(ctx),
                    ctx.timeout().as_secs()
                ))
                .with_duration_ms(elapsed_ms(start));
            }
        };

        if !status.success() {
            return StageOutput::fail(format!("'{}' exited with {status}", self.command_line(ctx)))
                .with_duration_ms(elapsed_ms(start));
        }

        let output = match &self.produces {
            Some(relative) => {
                let produced = ctx.staging_root().join(relative);
                if !produced.exists() {
                    return StageOutput::fail(format!(
                        "'{}' succeeded but produced nothing at {}",
                        self.command_line(ctx),
                        produced.display()
                    ))
                    .with_duration_ms(elapsed_ms(start));
                }
                StageOutput::ok(produced)
            }
            None => StageOutput::ok_empty(),
        };
        output.with_duration_ms(elapsed_ms(start))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
