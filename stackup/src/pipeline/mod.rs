//! Stage graph building, variant resolution and execution.
//!
//! This module provides:
//! - Stage keys and nodes
//! - A stage graph builder with validation
//! - The sequential stage graph executor
//! - The variant resolver and the default stage table
//! - Copy plan application

mod assemble;
mod builder;
mod dag;
mod resolver;
mod spec;
mod table;

pub use assemble::{apply_copy_plan, image_path, PLAN_MANIFEST};
pub use builder::StageGraphBuilder;
pub use dag::{BuildSettings, GraphExecutionResult, StageGraph};
pub use resolver::{resolve, ResolvedComponent, ResolvedPlan, APP_DESTINATION};
pub use spec::{StageKey, StageNode};
pub use table::{default_stage_graph, APP_ARTIFACT, COMPILED_TOOLCHAIN, DEFAULT_BASES};
