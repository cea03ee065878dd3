//! Core domain model types for stackup.
//!
//! This module contains the fundamental build types:
//! - Stage kind and status enums
//! - Stage output
//! - Artifact copy entries

mod artifact;
mod output;
mod status;

pub use artifact::{ArtifactCopy, ArtifactCopyPlan};
pub use output::StageOutput;
pub use status::{StageKind, StageStatus};
