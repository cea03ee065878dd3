//! Artifact copy plan entries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One copy from a stage's output into the final image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCopy {
    /// The stage that produces the source.
    pub source_stage: String,
    /// Source path, relative to the staging root.
    pub source_path: PathBuf,
    /// Absolute destination path inside the image.
    ///
    /// Identical whether the source stage is real or stub.
    pub destination: PathBuf,
}

impl ArtifactCopy {
    /// Creates a new copy entry.
    #[must_use]
    pub fn new(
        source_stage: impl Into<String>,
        source_path: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_stage: source_stage.into(),
            source_path: source_path.into(),
            destination: destination.into(),
        }
    }
}

/// Ordered list of copies applied when assembling the image.
pub type ArtifactCopyPlan = Vec<ArtifactCopy>;
