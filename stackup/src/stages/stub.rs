//! Stub stages for disabled components.

use super::{Stage, StageContext};
use crate::core::StageOutput;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File name of the placeholder a stub stage writes.
pub const STUB_MARKER: &str = "STACKUP_STUB";

/// Writes an inert placeholder directory.
///
/// The directory exists so the copy plan and the runtime layout do not
/// depend on which variant was built; only its content signals "disabled".
#[derive(Debug, Clone)]
pub struct StubStage {
    name: String,
    produces: PathBuf,
    component: String,
}

impl StubStage {
    /// Creates a stub stage for a component.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        component: impl Into<String>,
        produces: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            produces: produces.into(),
            component: component.into(),
        }
    }
}

#[async_trait]
impl Stage for StubStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let dir = ctx.staging_root().join(&self.produces);
        let marker = dir.join(STUB_MARKER);
        let content = format!("component '{}' was disabled at build time\n", self.component);

        let written = write_placeholder(&dir, &marker, content).await;

        match written {
            Ok(()) => StageOutput::ok(dir),
            Err(e) => StageOutput::fail(format!("cannot write placeholder {}: {e}", marker.display())),
        }
    }
}

async fn write_placeholder(dir: &Path, marker: &Path, content: String) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(marker, content).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_writes_marker() {
        let staging = tempfile::tempdir().unwrap();
        let stage = StubStage::new("network-false", "network", "stubs/network");
        let ctx = StageContext::new("network-false", staging.path(), staging.path());

        let output = stage.execute(&ctx).await;
        assert!(output.is_success());

        let marker = staging.path().join("stubs/network").join(STUB_MARKER);
        let content = std::fs::read_to_string(marker).unwrap();
        assert!(content.contains("network"));
    }

    #[tokio::test]
    async fn test_stub_is_idempotent() {
        let staging = tempfile::tempdir().unwrap();
        let stage = StubStage::new("execution-false", "execution", "stubs/execution");
        let ctx = StageContext::new("execution-false", staging.path(), staging.path());

        assert!(stage.execute(&ctx).await.is_success());
        assert!(stage.execute(&ctx).await.is_success());
    }
}
