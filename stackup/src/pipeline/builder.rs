//! Stage graph builder with validation.

use super::{StageGraph, StageKey, StageNode};
use crate::core::StageKind;
use crate::errors::StageGraphError;
use std::collections::{HashMap, HashSet};

/// Builder for validated stage graphs.
///
/// Nodes may be registered in any order; dependency checks run in
/// [`StageGraphBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct StageGraphBuilder {
    /// Nodes by name.
    stages: HashMap<String, StageNode>,
    /// Insertion order for determinism.
    stage_order: Vec<String>,
}

impl StageGraphBuilder {
    /// Creates a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is invalid on its own or its name is
    /// already registered.
    pub fn stage(mut self, node: StageNode) -> Result<Self, StageGraphError> {
        self.add_stage(node)?;
        Ok(self)
    }

    /// Registers a node in place.
    ///
    /// # Errors
    ///
    /// See [`StageGraphBuilder::stage`].
    pub fn add_stage(&mut self, node: StageNode) -> Result<(), StageGraphError> {
        node.validate()?;
        if self.stages.contains_key(&node.name) {
            return Err(StageGraphError::duplicate(&node.name));
        }
        self.stage_order.push(node.name.clone());
        self.stages.insert(node.name.clone(), node);
        Ok(())
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the whole graph and builds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty, names an unknown dependency,
    /// has a stub depending on a real stage, or contains a cycle.
    pub fn build(self) -> Result<StageGraph, StageGraphError> {
        if self.stages.is_empty() {
            return Err(StageGraphError::empty());
        }

        for name in &self.stage_order {
            let node = &self.stages[name];
            for dep in &node.depends_on {
                let Some(target) = self.stages.get(dep) else {
                    return Err(StageGraphError::missing_dependency(name, dep));
                };
                if node.kind == StageKind::Stub && target.kind == StageKind::Real {
                    return Err(StageGraphError::stub_depends_on_real(name, dep));
                }
            }
        }

        self.detect_cycles()?;

        let keys: HashMap<StageKey, String> = self
            .stages
            .values()
            .map(|node| (node.key.clone(), node.name.clone()))
            .collect();

        Ok(StageGraph::new(self.stages, keys, self.stage_order))
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), StageGraphError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.stage_order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(StageGraphError::cycle(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(stage) = self.stages.get(node) {
            for dep in &stage.depends_on {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Acceleration, Component, RuntimeKind};
    use crate::stages::{NoOpStage, Stage};
    use std::sync::Arc;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    fn support(name: &str) -> StageNode {
        StageNode::real(StageKey::Support(name.to_string()), noop(name))
    }

    #[test]
    fn test_builder_add_stage() {
        let builder = StageGraphBuilder::new()
            .stage(support("toolchain"))
            .unwrap();
        assert_eq!(builder.stage_count(), 1);
    }

    #[test]
    fn test_builder_empty_build() {
        let err = StageGraphBuilder::new().build().unwrap_err();
        assert_eq!(err.error_info.code, "GRAPH-001-EMPTY");
    }

    #[test]
    fn test_builder_duplicate() {
        let err = StageGraphBuilder::new()
            .stage(support("toolchain"))
            .unwrap()
            .stage(support("toolchain"))
            .unwrap_err();
        assert_eq!(err.error_info.code, "GRAPH-005-DUPLICATE");
    }

    #[test]
    fn test_builder_missing_dependency() {
        let err = StageGraphBuilder::new()
            .stage(support("a").with_dependency("missing"))
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.error_info.code, "GRAPH-003-MISSING_DEP");
        assert_eq!(err.stages, vec!["a".to_string(), "missing".to_string()]);
    }

    #[test]
    fn test_builder_dependencies_in_any_order() {
        let graph = StageGraphBuilder::new()
            .stage(support("b").with_dependency("a"))
            .unwrap()
            .stage(support("a"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(graph.stage_count(), 2);
    }

    #[test]
    fn test_builder_cycle_detection() {
        let err = StageGraphBuilder::new()
            .stage(support("a").with_dependency("c"))
            .unwrap()
            .stage(support("b").with_dependency("a"))
            .unwrap()
            .stage(support("c").with_dependency("b"))
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.error_info.code, "GRAPH-002-CYCLE");
        assert_eq!(err.stages.first(), err.stages.last());
    }

    #[test]
    fn test_stub_may_not_depend_on_real() {
        let stub = StageNode::stub(StageKey::Component(Component::Network, false), noop("stub"))
            .producing("stubs/network")
            .with_dependency("toolchain");
        let err = StageGraphBuilder::new()
            .stage(support("toolchain"))
            .unwrap()
            .stage(stub)
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.error_info.code, "GRAPH-004-STUB_DEPENDS_ON_REAL");
    }

    #[test]
    fn test_stub_may_depend_on_stub() {
        let base_stub = StageNode::stub(StageKey::Support("placeholder-root".into()), noop("root"));
        let stub = StageNode::stub(StageKey::Component(Component::Network, false), noop("stub"))
            .producing("stubs/network")
            .with_dependency("placeholder-root");
        let base = StageNode::real(
            StageKey::Base(RuntimeKind::Interpreted, Acceleration::Cpu),
            noop("base"),
        )
        .producing("app");

        let graph = StageGraphBuilder::new()
            .stage(base_stub)
            .unwrap()
            .stage(stub)
            .unwrap()
            .stage(base)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(graph.stage_count(), 3);
    }
}
