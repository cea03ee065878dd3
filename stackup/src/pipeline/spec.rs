//! Stage keys and stage nodes.

use crate::config::{Acceleration, Component, RuntimeKind};
use crate::core::StageKind;
use crate::errors::StageGraphError;
use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Composite lookup key for a stage.
///
/// The set of supported variants is exactly the set of keys registered in
/// a stage graph; anything else resolves to `UnsupportedVariant`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    /// Base runtime stage, `{runtime}-{acceleration}`.
    Base(RuntimeKind, Acceleration),
    /// Component terminal stage, `{component}-{enabled}`.
    Component(Component, bool),
    /// A supporting stage other stages depend on (toolchains and the like).
    Support(String),
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(runtime, accel) => write!(f, "{runtime}-{accel}"),
            Self::Component(component, enabled) => write!(f, "{component}-{enabled}"),
            Self::Support(name) => f.write_str(name),
        }
    }
}

/// One node of the stage graph.
#[derive(Debug, Clone)]
pub struct StageNode {
    /// Lookup key.
    pub key: StageKey,
    /// Unique stage name (the rendered key).
    pub name: String,
    /// Real producer or stub.
    pub kind: StageKind,
    /// Artifact path relative to the staging root.
    pub produces: Option<PathBuf>,
    /// Names of stages this stage depends on.
    pub depends_on: BTreeSet<String>,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
}

impl StageNode {
    /// Creates a real stage node.
    #[must_use]
    pub fn real(key: StageKey, runner: Arc<dyn Stage>) -> Self {
        Self::new(key, StageKind::Real, runner)
    }

    /// Creates a stub stage node.
    #[must_use]
    pub fn stub(key: StageKey, runner: Arc<dyn Stage>) -> Self {
        Self::new(key, StageKind::Stub, runner)
    }

    fn new(key: StageKey, kind: StageKind, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: key.to_string(),
            key,
            kind,
            produces: None,
            depends_on: BTreeSet::new(),
            runner,
        }
    }

    /// Declares the artifact path.
    #[must_use]
    pub fn producing(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces = Some(path.into());
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.insert(dep.into());
        self
    }

    /// Validates the node in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the node depends on itself, or if a base or
    /// component node declares no artifact.
    pub fn validate(&self) -> Result<(), StageGraphError> {
        if self.depends_on.contains(&self.name) {
            return Err(StageGraphError::cycle(vec![
                self.name.clone(),
                self.name.clone(),
            ]));
        }
        let needs_artifact = matches!(self.key, StageKey::Base(..) | StageKey::Component(..));
        if needs_artifact && self.produces.is_none() {
            return Err(StageGraphError::missing_artifact(&self.name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            StageKey::Base(RuntimeKind::Interpreted, Acceleration::Cpu).to_string(),
            "interpreted-cpu"
        );
        assert_eq!(
            StageKey::Base(RuntimeKind::BrowserBundle, Acceleration::Gpu).to_string(),
            "browser-bundle-gpu"
        );
        assert_eq!(StageKey::Component(Component::Network, false).to_string(), "network-false");
        assert_eq!(StageKey::Support("compiled-toolchain".into()).to_string(), "compiled-toolchain");
    }

    #[test]
    fn test_node_name_follows_key() {
        let node = StageNode::stub(StageKey::Component(Component::Execution, false), noop("x"))
            .producing("stubs/execution");
        assert_eq!(node.name, "execution-false");
        assert_eq!(node.kind, StageKind::Stub);
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let node = StageNode::real(StageKey::Support("tool".into()), noop("tool"))
            .with_dependency("tool");
        assert_eq!(node.validate().unwrap_err().error_info.code, "GRAPH-002-CYCLE");
    }

    #[test]
    fn test_component_without_artifact_rejected() {
        let node = StageNode::real(StageKey::Component(Component::Network, true), noop("n"));
        assert_eq!(
            node.validate().unwrap_err().error_info.code,
            "GRAPH-006-NO_ARTIFACT"
        );
    }
}
