//! Overlay composition of service-definition documents.
//!
//! A base document is deep-merged with an ordered list of named overlays.
//! Missing overlays are recoverable; a missing or broken base is not.

mod document;

pub use document::{deep_merge, Endpoint, ServiceDocument};

use crate::errors::{DocumentError, OverlayNotFoundError, StackupError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory, relative to the overlay directory, holding rendered output.
pub const RENDER_DIR: &str = ".stackup";

/// File name of the rendered compose document.
pub const RENDERED_FILE: &str = "compose.rendered.json";

/// Directory compose resolves relative paths and `.env` against for a
/// compose file.
///
/// For a file rendered under [`RENDER_DIR`] that is the overlay directory,
/// not the render directory; for any other file it is the file's own
/// directory.
#[must_use]
pub fn project_directory(compose_file: &Path) -> PathBuf {
    let parent = compose_file.parent().unwrap_or_else(|| Path::new("."));
    let dir = if parent.file_name().is_some_and(|name| name == RENDER_DIR) {
        parent.parent().unwrap_or(parent)
    } else {
        parent
    };
    if dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        dir.to_path_buf()
    }
}

/// A named service-definition document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayName {
    /// The base document every composition starts from.
    Base,
    /// Development overrides.
    Dev,
    /// Production overrides.
    Prod,
    /// GPU resource reservations.
    Gpu,
}

impl OverlayName {
    /// The name as written in file names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Gpu => "gpu",
        }
    }

    /// File name of this document.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Base => "docker-compose.yml".to_string(),
            other => format!("docker-compose.{}.yml", other.as_str()),
        }
    }
}

impl fmt::Display for OverlayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of composing a base with overlays.
#[derive(Debug, Clone)]
pub struct ComposeOutcome {
    /// The merged document.
    pub merged: ServiceDocument,
    /// Overlays that were applied, in order.
    pub applied: Vec<OverlayName>,
    /// Overlays that were requested but absent.
    pub missing: Vec<OverlayNotFoundError>,
}

/// Merges `overlays` onto `base` in order. Later documents win.
#[must_use]
pub fn compose(base: ServiceDocument, overlays: impl IntoIterator<Item = ServiceDocument>) -> ServiceDocument {
    overlays.into_iter().fold(base, |mut merged, overlay| {
        merged.merge(overlay);
        merged
    })
}

/// Loads and composes overlay files from one directory.
#[derive(Debug, Clone)]
pub struct OverlayComposer {
    overlay_dir: PathBuf,
}

impl OverlayComposer {
    /// Creates a composer over `overlay_dir`.
    #[must_use]
    pub fn new(overlay_dir: impl Into<PathBuf>) -> Self {
        Self {
            overlay_dir: overlay_dir.into(),
        }
    }

    /// The overlay directory.
    #[must_use]
    pub fn overlay_dir(&self) -> &Path {
        &self.overlay_dir
    }

    /// Path of a named document.
    #[must_use]
    pub fn path_for(&self, name: OverlayName) -> PathBuf {
        self.overlay_dir.join(name.file_name())
    }

    /// Path the merged document is rendered to.
    #[must_use]
    pub fn rendered_path(&self) -> PathBuf {
        self.overlay_dir.join(RENDER_DIR).join(RENDERED_FILE)
    }

    /// Composes the base document with `overlays`, in order.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the base is missing or any present document
    /// fails to parse. Missing overlays are reported in the outcome.
    pub fn compose(&self, overlays: &[OverlayName]) -> Result<ComposeOutcome, StackupError> {
        let base_path = self.path_for(OverlayName::Base);
        if !base_path.is_file() {
            return Err(DocumentError::new(&base_path, "base document not found").into());
        }
        let mut merged = ServiceDocument::load(&base_path)?;
        let mut applied = Vec::new();
        let mut missing = Vec::new();

        for &name in overlays.iter().filter(|n| **n != OverlayName::Base) {
            let path = self.path_for(name);
            if !path.is_file() {
                let err = OverlayNotFoundError::new(name.as_str(), &path);
                warn!(overlay = %name, path = %path.display(), "Overlay not found, skipping");
                missing.push(err);
                continue;
            }
            debug!(overlay = %name, path = %path.display(), "Applying overlay");
            merged.merge(ServiceDocument::load(&path)?);
            applied.push(name);
        }

        info!(applied = ?applied, services = ?merged.service_names(), "Composed service definitions");
        Ok(ComposeOutcome {
            merged,
            applied,
            missing,
        })
    }

    /// Writes the merged document as JSON and returns its path.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Serialization` on failure.
    pub fn render(&self, document: &ServiceDocument) -> Result<PathBuf, StackupError> {
        let path = self.rendered_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(document)?)?;
        debug!(path = %path.display(), "Rendered compose document");
        Ok(path)
    }
}
