//! # Stackup
//!
//! Build-variant resolution, container entrypoint dispatch and
//! health-verified startup for polyglot service images.
//!
//! Stackup covers three moments in a service image's life:
//!
//! - **Build**: a [`config::BuildConfig`] is resolved against a validated
//!   stage graph into a [`pipeline::ResolvedPlan`]. Disabled components are
//!   satisfied by stub stages, so the image layout never depends on the
//!   variant.
//! - **Container start**: the [`dispatch`] module inspects the assembled
//!   image and execs the right server for the runtime kind.
//! - **Host startup**: the [`orchestrator`] composes service definitions,
//!   launches them and waits for health targets with a bounded, monotonic
//!   verifier.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackup::prelude::*;
//!
//! let graph = default_stage_graph()?;
//! let config = BuildConfig::new(RuntimeKind::Interpreted, Acceleration::Cpu)
//!     .with_component(Component::Network, false);
//! let plan = resolve(&graph, &config)?;
//!
//! let settings = BuildSettings::new("/tmp/staging", ".");
//! graph.execute(&plan.selected_stages(), &settings).await?;
//! apply_copy_plan(&plan, &settings.staging_root, Path::new("/tmp/image"))?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod compose;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod health;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::compose::{OverlayComposer, OverlayName, ServiceDocument};
    pub use crate::config::{
        Acceleration, BuildConfig, BuildParams, Component, DispatchConfig, FailSoftPolicy,
        RuntimeKind,
    };
    pub use crate::core::{ArtifactCopy, StageKind, StageOutput, StageStatus};
    pub use crate::errors::{ErrorInfo, StackupError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::health::{HealthCheck, HealthReport, HealthTarget, HealthVerifier, Prober};
    pub use crate::orchestrator::{
        ContainerRuntime, DockerCompose, Orchestrator, OrchestratorConfig, OrchestratorState,
        RunReport,
    };
    pub use crate::pipeline::{
        apply_copy_plan, default_stage_graph, resolve, BuildSettings, ResolvedPlan, StageGraph,
        StageGraphBuilder, StageKey, StageNode,
    };
    pub use crate::stages::{CommandStage, Stage, StageContext, StubStage};
}
