//! Variant resolution: from a build configuration to the stages to run.
//!
//! Resolution is a pure two-level lookup over the stage graph's keys. It
//! never executes anything, so an unsupported variant is reported before
//! any stage has a chance to produce partial output.

use super::{StageGraph, StageKey};
use crate::config::{BuildConfig, Component, RuntimeKind};
use crate::core::{ArtifactCopy, ArtifactCopyPlan, StageKind};
use crate::errors::UnsupportedVariantError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// In-image destination of the base stage's application artifact.
pub const APP_DESTINATION: &str = "/app";

/// The terminal stage picked for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    /// Selected stage name.
    pub stage: String,
    /// Whether that stage is real or a stub.
    pub kind: StageKind,
}

/// Output of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlan {
    /// Image reference the plan builds.
    pub image: String,
    /// Selected base runtime stage.
    pub base_stage: String,
    /// One terminal stage per component.
    pub component_stages: BTreeMap<Component, ResolvedComponent>,
    /// Ordered copies into the final image.
    pub copy_plan: ArtifactCopyPlan,
    /// Runtime kind the entrypoint dispatcher runs as.
    pub dispatch_mode: RuntimeKind,
}

impl ResolvedPlan {
    /// Stages to hand to the executor: the base, then each component.
    #[must_use]
    pub fn selected_stages(&self) -> Vec<String> {
        std::iter::once(self.base_stage.clone())
            .chain(self.component_stages.values().map(|c| c.stage.clone()))
            .collect()
    }

    /// Names of components that resolved to a stub.
    #[must_use]
    pub fn stubbed_components(&self) -> Vec<Component> {
        self.component_stages
            .iter()
            .filter(|(_, c)| c.kind == StageKind::Stub)
            .map(|(component, _)| *component)
            .collect()
    }
}

/// Resolves a build configuration against a stage graph.
///
/// Every component with a registered terminal stage is resolved, plus any
/// component named in the configuration. Components resolve independently;
/// flags are never cross-validated.
///
/// # Errors
///
/// Returns `UnsupportedVariantError` if no base stage is registered for the
/// runtime/acceleration pair, or a component has no stage for its flag.
pub fn resolve(
    graph: &StageGraph,
    config: &BuildConfig,
) -> Result<ResolvedPlan, UnsupportedVariantError> {
    let base_key = StageKey::Base(config.runtime_kind, config.acceleration);
    let base = graph.node_for(&base_key).ok_or_else(|| {
        UnsupportedVariantError::new(
            base_key.to_string(),
            format!(
                "no base stage for runtime '{}' with {} acceleration",
                config.runtime_kind, config.acceleration
            ),
        )
    })?;

    let mut copy_plan = Vec::new();
    if let Some(produces) = &base.produces {
        copy_plan.push(ArtifactCopy::new(&base.name, produces, APP_DESTINATION));
    }

    let components: BTreeSet<Component> = graph
        .components()
        .into_iter()
        .chain(config.component_flags.keys().copied())
        .collect();

    let mut component_stages = BTreeMap::new();
    for component in components {
        let key = StageKey::Component(component, config.is_enabled(component));
        let node = graph.node_for(&key).ok_or_else(|| {
            UnsupportedVariantError::new(key.to_string(), "no stage registered for component flag")
        })?;

        let source: PathBuf = node.produces.clone().unwrap_or_default();
        copy_plan.push(ArtifactCopy::new(&node.name, source, component.destination()));
        component_stages.insert(
            component,
            ResolvedComponent {
                stage: node.name.clone(),
                kind: node.kind,
            },
        );
    }

    Ok(ResolvedPlan {
        image: config.image_reference(),
        base_stage: base.name.clone(),
        component_stages,
        copy_plan,
        dispatch_mode: config.runtime_kind,
    })
}
