//! Per-stage execution context.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default upper bound for a single build command.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// What a stage sees while it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    stage_name: String,
    staging_root: PathBuf,
    source_root: PathBuf,
    timeout: Duration,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        staging_root: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            staging_root: staging_root.into(),
            source_root: source_root.into(),
            timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The running stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Directory stage outputs are written under.
    #[must_use]
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Application source tree.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Upper bound for any command the stage runs.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Top-level entry of the source tree that holds the staging root, if
    /// the staging root lives inside the source tree.
    ///
    /// Commands that copy the source tree must leave this entry out, or
    /// they would copy the staging root into itself.
    #[must_use]
    pub fn nested_staging_entry(&self) -> Option<String> {
        let relative = self.staging_root.strip_prefix(&self.source_root).ok()?;
        match relative.components().next()? {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    /// Expands the `{staging}`, `{source}` and `{exclude}` placeholders in a
    /// command argument. `{exclude}` is empty unless staging is nested in
    /// the source tree.
    #[must_use]
    pub fn expand(&self, arg: &str) -> String {
        arg.replace("{staging}", &self.staging_root.to_string_lossy())
            .replace("{source}", &self.source_root.to_string_lossy())
            .replace("{exclude}", &self.nested_staging_entry().unwrap_or_default())
    }
}
