//! StageGraph: the static stage table and its sequential executor.
//!
//! Execution takes a selection of stages, closes it over dependencies,
//! orders it topologically and runs every stage exactly once.

use super::{StageKey, StageNode};
use crate::config::Component;
use crate::core::StageOutput;
use crate::errors::{BuildStepFailedError, StackupError, StageGraphError};
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::{StageContext, DEFAULT_STAGE_TIMEOUT};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Where and how stages run.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Root under which stage artifacts are written.
    pub staging_root: PathBuf,
    /// Application source tree.
    pub source_root: PathBuf,
    /// Upper bound for each stage.
    pub stage_timeout: Duration,
}

impl BuildSettings {
    /// Creates build settings with the default stage timeout.
    ///
    /// Both roots are made absolute against the current directory.
    #[must_use]
    pub fn new(staging_root: impl Into<PathBuf>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: absolutize(staging_root.into()),
            source_root: absolutize(source_root.into()),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// Result of executing a stage selection.
#[derive(Debug)]
pub struct GraphExecutionResult {
    /// Per-stage outputs.
    pub outputs: BTreeMap<String, StageOutput>,
    /// Stages in the order they ran.
    pub executed: Vec<String>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
}

/// A validated, acyclic set of stages. Build with [`super::StageGraphBuilder`].
pub struct StageGraph {
    /// Nodes by name.
    stages: HashMap<String, StageNode>,
    /// Name lookup by composite key.
    keys: HashMap<StageKey, String>,
    /// Registration order, used to make traversal deterministic.
    stage_order: Vec<String>,
    /// Lifecycle event sink.
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("stages", &self.stage_order)
            .finish_non_exhaustive()
    }
}

impl StageGraph {
    pub(crate) fn new(
        stages: HashMap<String, StageNode>,
        keys: HashMap<StageKey, String>,
        stage_order: Vec<String>,
    ) -> Self {
        Self {
            stages,
            keys,
            stage_order,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink stage lifecycle events go to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Looks a node up by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&StageNode> {
        self.stages.get(name)
    }

    /// Looks a node up by composite key.
    #[must_use]
    pub fn node_for(&self, key: &StageKey) -> Option<&StageNode> {
        self.keys.get(key).and_then(|name| self.stages.get(name))
    }

    /// Stage names in registration order.
    #[must_use]
    pub fn stage_names(&self) -> &[String] {
        &self.stage_order
    }

    /// Components that have at least one terminal stage registered.
    #[must_use]
    pub fn components(&self) -> BTreeSet<Component> {
        self.keys
            .keys()
            .filter_map(|key| match key {
                StageKey::Component(component, _) => Some(*component),
                _ => None,
            })
            .collect()
    }

    /// Closes `selected` over its dependencies and orders it topologically.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected stage is not registered.
    pub fn execution_order(&self, selected: &[String]) -> Result<Vec<String>, StageGraphError> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        for name in selected {
            if !self.stages.contains_key(name) {
                return Err(StageGraphError::missing_dependency("<selection>", name));
            }
            self.visit(name, &mut visited, &mut result);
        }

        Ok(result)
    }

    fn visit(&self, node: &str, visited: &mut HashSet<String>, result: &mut Vec<String>) {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(stage) = self.stages.get(node) {
            for dep in &stage.depends_on {
                self.visit(dep, visited, result);
            }
        }
        result.push(node.to_string());
    }

    /// Runs the selected stages and their dependencies, each exactly once.
    ///
    /// Stages run sequentially. The first failing stage stops execution.
    ///
    /// # Errors
    ///
    /// Returns `StageGraph` if the selection names an unknown stage, or
    /// `BuildStepFailed` for the first stage that fails.
    pub async fn execute(
        &self,
        selected: &[String],
        settings: &BuildSettings,
    ) -> Result<GraphExecutionResult, StackupError> {
        let start = Instant::now();
        let order = self.execution_order(selected)?;
        let mut outputs: BTreeMap<String, StageOutput> = BTreeMap::new();
        let mut executed = Vec::with_capacity(order.len());

        info!(stages = ?order, "Executing build stages");

        for name in order {
            if outputs.contains_key(&name) {
                continue;
            }
            let node = &self.stages[&name];
            let ctx = StageContext::new(&name, &settings.staging_root, &settings.source_root)
                .with_timeout(settings.stage_timeout);

            self.event_sink.try_emit(
                "stage.started",
                Some(serde_json::json!({ "stage": &name, "kind": node.kind })),
            );

            let output = node.runner.execute(&ctx).await;
            executed.push(name.clone());

            if !output.is_success() {
                let reason = output.error.clone().unwrap_or_else(|| "unknown error".to_string());
                error!(stage = %name, error = %reason, "Build stage failed");
                self.event_sink.try_emit(
                    "stage.failed",
                    Some(serde_json::json!({
                        "stage": &name,
                        "error": &reason,
                        "duration_ms": output.duration_ms,
                    })),
                );
                return Err(BuildStepFailedError::new(name, reason).into());
            }

            info!(stage = %name, kind = %node.kind, duration_ms = output.duration_ms, "Build stage completed");
            self.event_sink.try_emit(
                "stage.completed",
                Some(serde_json::json!({
                    "stage": &name,
                    "duration_ms": output.duration_ms,
                })),
            );
            outputs.insert(name, output);
        }

        Ok(GraphExecutionResult {
            outputs,
            executed,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }
}
