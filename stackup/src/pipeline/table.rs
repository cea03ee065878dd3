//! The default stage table.
//!
//! Build commands run through `sh -c` with the staging root as `$1`, the
//! source root as `$2` and a per-stage argument as `$3`. Scripts that copy
//! the source tree get the top-level entry holding a nested staging root as
//! `$4` and leave it out.

use super::{StageGraph, StageGraphBuilder, StageKey, StageNode};
use crate::config::{Acceleration, Component, RuntimeKind};
use crate::errors::StageGraphError;
use crate::stages::{CommandStage, Stage, StubStage};
use std::sync::Arc;

/// Name of the support stage every real compiled producer depends on.
pub const COMPILED_TOOLCHAIN: &str = "compiled-toolchain";

/// Artifact path of every base stage, relative to the staging root.
pub const APP_ARTIFACT: &str = "app";

const INTERPRETED_SCRIPT: &str = r#"set -e
mkdir -p "$1/app"
for entry in "$2"/* "$2"/.[!.]* "$2"/..?*; do
  [ -e "$entry" ] || continue
  if [ -n "$4" ] && [ "${entry##*/}" = "$4" ]; then continue; fi
  cp -R "$entry" "$1/app/"
done
req="$2/requirements.txt"
if [ "$3" = gpu ] && [ -f "$2/requirements-gpu.txt" ]; then req="$2/requirements-gpu.txt"; fi
if [ -f "$req" ]; then pip install --no-cache-dir --target "$1/app/.deps" -r "$req"; fi
"#;

const COMPILED_SCRIPT: &str = r#"set -e
features=""
if [ "$3" = gpu ]; then features="--features gpu"; fi
cargo build --release --manifest-path "$2/Cargo.toml" --target-dir "$1/target" $features
mkdir -p "$1/app"
cp "$1/target/release/app-service" "$1/app/"
"#;

const MANAGED_SCRIPT: &str = r#"set -e
dotnet publish "$2" -c Release -o "$1/app"
"#;

const BROWSER_BUNDLE_SCRIPT: &str = r#"set -e
mkdir -p "$1/app"
for entry in "$2"/* "$2"/.[!.]* "$2"/..?*; do
  [ -e "$entry" ] || continue
  if [ -n "$4" ] && [ "${entry##*/}" = "$4" ]; then continue; fi
  cp -R "$entry" "$1/app/"
done
cd "$1/app"
if [ -f package-lock.json ]; then npm ci --omit=dev; else npm install --omit=dev; fi
"#;

const COMPONENT_SCRIPT: &str = r#"set -e
target="$1/components/$3/target"
cargo build --release --manifest-path "$2/components/$3/Cargo.toml" --target-dir "$target"
mkdir -p "$1/components/$3/bin"
for f in "$target/release"/*; do
  case "$f" in *.d|*.rlib|*.so|*.dylib) continue ;; esac
  if [ -f "$f" ] && [ -x "$f" ]; then cp "$f" "$1/components/$3/bin/"; fi
done
"#;

/// Artifact of a real component stage: only the built executables, not the
/// cargo target tree.
fn component_artifact(component: Component) -> String {
    format!("components/{component}/bin")
}

fn script_stage(name: &str, script: &str, extra: &str) -> CommandStage {
    CommandStage::new(
        name,
        "sh",
        ["-c", script, "stackup-stage", "{staging}", "{source}", extra, "{exclude}"],
    )
}

fn base_script(runtime: RuntimeKind) -> &'static str {
    match runtime {
        RuntimeKind::Interpreted => INTERPRETED_SCRIPT,
        RuntimeKind::Compiled => COMPILED_SCRIPT,
        RuntimeKind::Managed => MANAGED_SCRIPT,
        RuntimeKind::BrowserBundle => BROWSER_BUNDLE_SCRIPT,
    }
}

/// Base runtime variants the default table supports.
///
/// Managed and browser-bundle images have no GPU variant.
pub const DEFAULT_BASES: [(RuntimeKind, Acceleration); 6] = [
    (RuntimeKind::Interpreted, Acceleration::Cpu),
    (RuntimeKind::Interpreted, Acceleration::Gpu),
    (RuntimeKind::Compiled, Acceleration::Cpu),
    (RuntimeKind::Compiled, Acceleration::Gpu),
    (RuntimeKind::Managed, Acceleration::Cpu),
    (RuntimeKind::BrowserBundle, Acceleration::Cpu),
];

/// Builds the default stage graph.
///
/// # Errors
///
/// Returns an error only if the table itself is malformed.
pub fn default_stage_graph() -> Result<StageGraph, StageGraphError> {
    let mut builder = StageGraphBuilder::new();

    let toolchain: Arc<dyn Stage> = Arc::new(CommandStage::new(
        COMPILED_TOOLCHAIN,
        "cargo",
        ["--version"],
    ));
    builder.add_stage(StageNode::real(
        StageKey::Support(COMPILED_TOOLCHAIN.to_string()),
        toolchain,
    ))?;

    for (runtime, accel) in DEFAULT_BASES {
        let key = StageKey::Base(runtime, accel);
        let name = key.to_string();
        let runner = script_stage(&name, base_script(runtime), accel.as_str()).producing(APP_ARTIFACT);
        let mut node = StageNode::real(key, Arc::new(runner)).producing(APP_ARTIFACT);
        if runtime == RuntimeKind::Compiled {
            node = node.with_dependency(COMPILED_TOOLCHAIN);
        }
        builder.add_stage(node)?;
    }

    for component in Component::ALL {
        let real_key = StageKey::Component(component, true);
        let real_name = real_key.to_string();
        let real_artifact = component_artifact(component);
        let runner = script_stage(&real_name, COMPONENT_SCRIPT, component.as_str())
            .producing(&real_artifact);
        builder.add_stage(
            StageNode::real(real_key, Arc::new(runner))
                .producing(&real_artifact)
                .with_dependency(COMPILED_TOOLCHAIN),
        )?;

        let stub_key = StageKey::Component(component, false);
        let stub_name = stub_key.to_string();
        let stub_artifact = format!("stubs/{component}");
        let runner = StubStage::new(&stub_name, component.as_str(), &stub_artifact);
        builder.add_stage(StageNode::stub(stub_key, Arc::new(runner)).producing(&stub_artifact))?;
    }

    builder.build()
}
