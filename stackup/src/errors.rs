//! Error types for stackup.
//!
//! Configuration-resolution errors (`UnsupportedVariant`, stage table
//! validation, unreadable base documents) are fatal and surface before any
//! side effect. Post-launch errors are accumulated into the run report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stackup operations.
#[derive(Debug, Error)]
pub enum StackupError {
    /// The requested build variant has no registered stage.
    #[error("{0}")]
    UnsupportedVariant(#[from] UnsupportedVariantError),

    /// The stage table failed validation.
    #[error("{0}")]
    StageGraph(#[from] StageGraphError),

    /// A named overlay document does not exist.
    #[error("{0}")]
    OverlayNotFound(#[from] OverlayNotFoundError),

    /// A service-definition document could not be read or parsed.
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// A build stage or image build failed.
    #[error("{0}")]
    BuildStepFailed(#[from] BuildStepFailedError),

    /// The dispatcher found nothing to run.
    #[error("{0}")]
    NoRunnableTarget(#[from] NoRunnableTargetError),

    /// Health targets were still unsatisfied when retries ran out.
    #[error("{0}")]
    HealthCheckTimeout(#[from] HealthCheckTimeoutError),

    /// The run was interrupted.
    #[error("Interrupted: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Structured diagnostics attached to an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "VARIANT-001-UNSUPPORTED").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            let context: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context));
        }

        map
    }
}

/// Raised when no stage is registered for a requested variant key.
#[derive(Debug, Clone, Error)]
#[error("Unsupported build variant '{key}': {reason}")]
pub struct UnsupportedVariantError {
    /// The stage key (or raw parameter) that could not be resolved.
    pub key: String,
    /// Why the key is unsupported.
    pub reason: String,
    /// Diagnostics.
    pub error_info: ErrorInfo,
}

impl UnsupportedVariantError {
    /// Creates a new unsupported variant error.
    #[must_use]
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        let key = key.into();
        let reason = reason.into();
        let info = ErrorInfo::new(
            "VARIANT-001-UNSUPPORTED",
            format!("No stage registered for '{key}'"),
        )
        .with_fix_hint("Pick a runtime/acceleration pair that the stage table registers.")
        .with_context_entry("key", key.clone());

        Self {
            key,
            reason,
            error_info: info,
        }
    }
}

/// Raised when the stage table is structurally invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StageGraphError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Diagnostics.
    pub error_info: ErrorInfo,
}

impl StageGraphError {
    /// A stage names a dependency that is not registered.
    #[must_use]
    pub fn missing_dependency(stage: &str, dependency: &str) -> Self {
        Self {
            message: format!("Stage '{stage}' depends on unknown stage '{dependency}'"),
            stages: vec![stage.to_string(), dependency.to_string()],
            error_info: ErrorInfo::new(
                "GRAPH-003-MISSING_DEP",
                format!("Dependency '{dependency}' not found"),
            )
            .with_fix_hint("Register the dependency before the stage that depends on it."),
        }
    }

    /// A stub stage depends on a real stage.
    #[must_use]
    pub fn stub_depends_on_real(stub: &str, real: &str) -> Self {
        Self {
            message: format!("Stub stage '{stub}' must not depend on real stage '{real}'"),
            stages: vec![stub.to_string(), real.to_string()],
            error_info: ErrorInfo::new(
                "GRAPH-004-STUB_DEPENDS_ON_REAL",
                "Stub stages may only depend on other stubs",
            )
            .with_fix_hint("Drop the dependency; stubs write placeholders and need no toolchain."),
        }
    }

    /// Two stages were registered under the same name.
    #[must_use]
    pub fn duplicate(stage: &str) -> Self {
        Self {
            message: format!("Stage '{stage}' is registered twice"),
            stages: vec![stage.to_string()],
            error_info: ErrorInfo::new("GRAPH-005-DUPLICATE", "Duplicate stage name"),
        }
    }

    /// A base or component stage declares no artifact path.
    #[must_use]
    pub fn missing_artifact(stage: &str) -> Self {
        Self {
            message: format!("Stage '{stage}' must declare the artifact it produces"),
            stages: vec![stage.to_string()],
            error_info: ErrorInfo::new(
                "GRAPH-006-NO_ARTIFACT",
                "Base and component stages need an artifact path for the copy plan",
            ),
        }
    }

    /// The graph has no stages at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            message: "Stage graph has no stages".to_string(),
            stages: Vec::new(),
            error_info: ErrorInfo::new("GRAPH-001-EMPTY", "Cannot build an empty stage graph")
                .with_fix_hint("Register at least one base stage before building."),
        }
    }

    /// The dependency graph has a cycle.
    #[must_use]
    pub fn cycle(cycle_path: Vec<String>) -> Self {
        let rendered = cycle_path.join(" -> ");
        Self {
            message: format!("Cycle detected in stage graph: {rendered}"),
            error_info: ErrorInfo::new(
                "GRAPH-002-CYCLE",
                format!("Stage graph contains a dependency cycle: {rendered}"),
            )
            .with_fix_hint("Remove one of the dependencies in the cycle to break it."),
            stages: cycle_path,
        }
    }
}

/// Raised when a requested overlay document is absent.
///
/// Recoverable: the composer logs it and merges the overlays that exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Overlay '{name}' not found at {}", path.display())]
pub struct OverlayNotFoundError {
    /// The overlay name.
    pub name: String,
    /// Where the overlay was expected.
    pub path: PathBuf,
}

impl OverlayNotFoundError {
    /// Creates a new overlay-not-found error.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Returns diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new("OVERLAY-001-NOT_FOUND", self.to_string())
            .with_context_entry("overlay", self.name.clone())
    }
}

/// Raised when a service-definition document cannot be loaded.
#[derive(Debug, Clone, Error)]
#[error("Cannot load '{}': {reason}", path.display())]
pub struct DocumentError {
    /// The document path.
    pub path: PathBuf,
    /// What went wrong.
    pub reason: String,
}

impl DocumentError {
    /// Creates a new document error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Raised when a build step fails.
#[derive(Debug, Clone, Error)]
#[error("Build step '{step}' failed: {reason}")]
pub struct BuildStepFailedError {
    /// The stage or command that failed.
    pub step: String,
    /// The failure reason.
    pub reason: String,
}

impl BuildStepFailedError {
    /// Creates a new build step failure.
    #[must_use]
    pub fn new(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Returns diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new("BUILD-001-STEP_FAILED", self.to_string())
            .with_context_entry("step", self.step.clone())
    }
}

/// Raised when the dispatcher finds no runnable target.
#[derive(Debug, Clone, Error)]
#[error("No runnable target for runtime '{runtime}': {reason}")]
pub struct NoRunnableTargetError {
    /// The runtime kind that was dispatched.
    pub runtime: String,
    /// What detection tried.
    pub reason: String,
}

impl NoRunnableTargetError {
    /// Creates a new no-runnable-target error.
    #[must_use]
    pub fn new(runtime: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            reason: reason.into(),
        }
    }

    /// Returns diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new("DISPATCH-001-NO_TARGET", self.to_string())
            .with_fix_hint("Set STACKUP_OVERRIDE_CMD to bypass entrypoint detection.")
    }
}

/// Raised when health verification exhausts its retries.
#[derive(Debug, Clone, Error)]
#[error("Health checks still failing after {rounds} rounds: {}", unsatisfied.join(", "))]
pub struct HealthCheckTimeoutError {
    /// Rounds performed.
    pub rounds: usize,
    /// Names of targets that never passed.
    pub unsatisfied: Vec<String>,
}

impl HealthCheckTimeoutError {
    /// Creates a new health check timeout.
    #[must_use]
    pub fn new(rounds: usize, unsatisfied: Vec<String>) -> Self {
        Self { rounds, unsatisfied }
    }

    /// Returns diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::new("HEALTH-001-TIMEOUT", self.to_string())
            .with_context_entry("rounds", self.rounds.to_string())
    }
}

impl StackupError {
    /// Returns structured diagnostics when the error carries them.
    #[must_use]
    pub fn error_info(&self) -> Option<ErrorInfo> {
        match self {
            Self::UnsupportedVariant(e) => Some(e.error_info.clone()),
            Self::StageGraph(e) => Some(e.error_info.clone()),
            Self::OverlayNotFound(e) => Some(e.error_info()),
            Self::BuildStepFailed(e) => Some(e.error_info()),
            Self::NoRunnableTarget(e) => Some(e.error_info()),
            Self::HealthCheckTimeout(e) => Some(e.error_info()),
            _ => None,
        }
    }
}
