//! Resolution and build scenarios over the default stage table.

use pretty_assertions::assert_eq;
use stackup::prelude::*;
use stackup::stages::STUB_MARKER;
use stackup::testing::MockStage;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

fn all_configs() -> Vec<BuildConfig> {
    let mut configs = Vec::new();
    for runtime in RuntimeKind::ALL {
        for accel in Acceleration::ALL {
            for network in [false, true] {
                for execution in [false, true] {
                    configs.push(
                        BuildConfig::new(runtime, accel)
                            .with_component(Component::Network, network)
                            .with_component(Component::Execution, execution),
                    );
                }
            }
        }
    }
    configs
}

#[test]
fn test_full_matrix_resolves_or_reports_unsupported() {
    let graph = default_stage_graph().unwrap();
    let mut supported = 0;

    for config in all_configs() {
        match resolve(&graph, &config) {
            Ok(plan) => {
                supported += 1;
                let base = graph.node(&plan.base_stage).unwrap();
                assert!(matches!(base.key, StageKey::Base(..)));
                assert_eq!(plan.component_stages.len(), Component::ALL.len());
                for component in Component::ALL {
                    let selected = &plan.component_stages[&component];
                    let expected_kind = if config.is_enabled(component) {
                        StageKind::Real
                    } else {
                        StageKind::Stub
                    };
                    assert_eq!(selected.kind, expected_kind);
                }
            }
            Err(err) => {
                assert_eq!(config.acceleration, Acceleration::Gpu);
                assert!(matches!(
                    config.runtime_kind,
                    RuntimeKind::Managed | RuntimeKind::BrowserBundle
                ));
                assert_eq!(err.error_info.code, "VARIANT-001-UNSUPPORTED");
            }
        }
    }

    // six base variants, four flag combinations each
    assert_eq!(supported, 6 * 4);
}

#[test]
fn test_destinations_are_flag_invariant_across_matrix() {
    let graph = default_stage_graph().unwrap();
    for config in all_configs() {
        let Ok(plan) = resolve(&graph, &config) else {
            continue;
        };
        let destinations: BTreeSet<PathBuf> =
            plan.copy_plan.iter().map(|c| c.destination.clone()).collect();
        let expected: BTreeSet<PathBuf> = ["/app", "/bin/network", "/bin/execution"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(destinations, expected);
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_interpreted_cpu_build_with_stubs() {
    let source = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let image = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("main.py"), "app = FastAPI()\n").unwrap();

    let graph = default_stage_graph().unwrap();
    let config = BuildConfig::new(RuntimeKind::Interpreted, Acceleration::Cpu)
        .with_component(Component::Network, false)
        .with_component(Component::Execution, false)
        .with_source_root(source.path());
    let plan = resolve(&graph, &config).unwrap();

    assert_eq!(plan.base_stage, "interpreted-cpu");
    assert_eq!(
        plan.selected_stages(),
        vec!["interpreted-cpu", "network-false", "execution-false"]
    );

    let settings = BuildSettings::new(staging.path(), source.path());
    let result = graph.execute(&plan.selected_stages(), &settings).await.unwrap();
    // Stubs never pull in the compiled toolchain.
    assert!(!result.executed.iter().any(|s| s == "compiled-toolchain"));

    apply_copy_plan(&plan, staging.path(), image.path()).unwrap();
    assert!(image.path().join("app/main.py").is_file());
    assert!(image.path().join("bin/network").join(STUB_MARKER).is_file());
    assert!(image.path().join("bin/execution").join(STUB_MARKER).is_file());
}

#[test]
fn test_build_params_from_lookup() {
    let params = BuildParams::from_lookup(|key| match key {
        "STACKUP_RUNTIME" => Some("compiled".to_string()),
        "STACKUP_ACCELERATION" => Some("cuda".to_string()),
        "STACKUP_COMPONENT_NETWORK" => Some("true".to_string()),
        _ => None,
    });
    let config = params.into_config().unwrap();
    let plan = resolve(&default_stage_graph().unwrap(), &config).unwrap();

    assert_eq!(plan.base_stage, "compiled-gpu");
    assert_eq!(plan.component_stages[&Component::Network].stage, "network-true");
    assert_eq!(plan.component_stages[&Component::Execution].stage, "execution-false");
}

#[tokio::test]
async fn test_custom_table_runs_each_selected_stage_once() {
    let staging = tempfile::tempdir().unwrap();
    let base = Arc::new(MockStage::new("interpreted-cpu"));
    let base_key = StageKey::Base(RuntimeKind::Interpreted, Acceleration::Cpu);

    let mut builder = StageGraphBuilder::new();
    builder
        .add_stage(StageNode::real(base_key, base.clone()).producing("app"))
        .unwrap();
    for component in Component::ALL {
        let key = StageKey::Component(component, false);
        let name = key.to_string();
        let artifact = format!("stubs/{component}");
        let stub = Arc::new(StubStage::new(&name, component.as_str(), &artifact));
        builder
            .add_stage(StageNode::stub(key, stub).producing(&artifact))
            .unwrap();
    }
    let graph = builder.build().unwrap();

    let config = BuildConfig::new(RuntimeKind::Interpreted, Acceleration::Cpu);
    let plan = resolve(&graph, &config).unwrap();
    let settings = BuildSettings::new(staging.path(), ".");
    graph.execute(&plan.selected_stages(), &settings).await.unwrap();

    assert_eq!(base.call_count(), 1);
    assert_eq!(
        base.staging_roots(),
        vec![staging.path().to_string_lossy().into_owned()]
    );
    assert!(staging.path().join("stubs/network").join(STUB_MARKER).is_file());

    // No real component stage is registered, so enabling one is unsupported.
    let enabled = config.with_component(Component::Network, true);
    let err = resolve(&graph, &enabled).unwrap_err();
    assert_eq!(err.key, "network-true");
}
