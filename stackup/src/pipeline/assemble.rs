//! Applies a resolved copy plan to an image root.

use super::ResolvedPlan;
use crate::errors::{BuildStepFailedError, StackupError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// File name of the plan manifest written into the image root.
pub const PLAN_MANIFEST: &str = "stackup-plan.json";

/// Maps an absolute in-image destination under `image_root`.
#[must_use]
pub fn image_path(image_root: &Path, destination: &Path) -> PathBuf {
    let relative = destination.strip_prefix("/").unwrap_or(destination);
    image_root.join(relative)
}

/// Copies every artifact of `plan` from `staging_root` into `image_root`,
/// then writes the plan manifest.
///
/// Returns the written destination paths in plan order.
///
/// # Errors
///
/// Returns `BuildStepFailed` if a planned source is missing, or `Io` if a
/// copy fails.
pub fn apply_copy_plan(
    plan: &ResolvedPlan,
    staging_root: &Path,
    image_root: &Path,
) -> Result<Vec<PathBuf>, StackupError> {
    let mut written = Vec::with_capacity(plan.copy_plan.len());

    for copy in &plan.copy_plan {
        let source = staging_root.join(&copy.source_path);
        if !source.exists() {
            return Err(BuildStepFailedError::new(
                &copy.source_stage,
                format!("artifact {} is missing", source.display()),
            )
            .into());
        }

        let target = image_path(image_root, &copy.destination);
        debug!(stage = %copy.source_stage, source = %source.display(), target = %target.display(), "Copying artifact");
        copy_tree(&source, &target)?;
        written.push(target);
    }

    fs::create_dir_all(image_root)?;
    let manifest = serde_json::to_string_pretty(plan)?;
    fs::write(image_root.join(PLAN_MANIFEST), manifest)?;

    info!(image = %plan.image, copies = written.len(), "Image root assembled");
    Ok(written)
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    if source.is_file() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, target)?;
        return Ok(());
    }

    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Acceleration, BuildConfig, RuntimeKind};
    use crate::pipeline::{default_stage_graph, resolve};
    use crate::stages::STUB_MARKER;

    fn stage_files(staging: &Path) {
        fs::create_dir_all(staging.join("app/pkg")).unwrap();
        fs::write(staging.join("app/main.py"), "app = None\n").unwrap();
        fs::write(staging.join("app/pkg/__init__.py"), "").unwrap();
        for component in ["network", "execution"] {
            let dir = staging.join("stubs").join(component);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(STUB_MARKER), "disabled\n").unwrap();
        }
    }

    #[test]
    fn test_image_path_strips_root() {
        assert_eq!(
            image_path(Path::new("/img"), Path::new("/bin/network")),
            PathBuf::from("/img/bin/network")
        );
    }

    #[test]
    fn test_apply_copy_plan_places_stubs_at_fixed_paths() {
        let staging = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();
        stage_files(staging.path());

        let config = BuildConfig::new(RuntimeKind::Interpreted, Acceleration::Cpu);
        let plan = resolve(&default_stage_graph().unwrap(), &config).unwrap();
        let written = apply_copy_plan(&plan, staging.path(), image.path()).unwrap();

        assert_eq!(written.len(), 3);
        assert!(image.path().join("app/main.py").is_file());
        assert!(image.path().join("app/pkg/__init__.py").is_file());
        assert!(image.path().join("bin/network").join(STUB_MARKER).is_file());
        assert!(image.path().join("bin/execution").join(STUB_MARKER).is_file());

        let manifest = fs::read_to_string(image.path().join(PLAN_MANIFEST)).unwrap();
        let decoded: ResolvedPlan = serde_json::from_str(&manifest).unwrap();
        assert_eq!(decoded, plan);
    }

    #[test]
    fn test_missing_artifact_fails() {
        let staging = tempfile::tempdir().unwrap();
        let image = tempfile::tempdir().unwrap();

        let config = BuildConfig::new(RuntimeKind::Interpreted, Acceleration::Cpu);
        let plan = resolve(&default_stage_graph().unwrap(), &config).unwrap();
        let err = apply_copy_plan(&plan, staging.path(), image.path()).unwrap_err();

        assert!(matches!(err, StackupError::BuildStepFailed(ref e) if e.step == "interpreted-cpu"));
    }
}
