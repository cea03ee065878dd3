//! Startup orchestration of a composed service set.
//!
//! One run walks `Idle → Preparing → Launching → Probing → Ready|Degraded`.
//! Only configuration problems abort a run; everything after launch is
//! collected into the [`RunReport`].

mod runtime;
mod state;

pub use runtime::{ContainerRuntime, DockerCompose, BUILD_TIMEOUT, UP_TIMEOUT};
pub use state::OrchestratorState;

use crate::cancellation::CancellationToken;
use crate::compose::{Endpoint, OverlayComposer, OverlayName};
use crate::config::DEFAULT_SERVICE_PORT;
use crate::errors::{BuildStepFailedError, ErrorInfo, StackupError};
use crate::events::{EventSink, NoOpEventSink};
use crate::health::{
    default_targets, load_targets, HealthReport, HealthTarget, HealthVerifier, Prober,
    DEFAULT_INTERVAL, DEFAULT_MAX_RETRIES, DEFAULT_PROBE_TIMEOUT,
};
use crate::observability::SpanTimer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Exit code of a ready run.
pub const EXIT_READY: i32 = 0;
/// Exit code of a configuration or usage error.
pub const EXIT_CONFIG_ERROR: i32 = 1;
/// Exit code of a degraded run.
pub const EXIT_DEGRADED: i32 = 3;
/// Exit code of an interrupted run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Post-launch wait when none is configured.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Everything one orchestrator run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Directory holding the overlay files.
    pub overlay_dir: PathBuf,
    /// Overlays applied on top of the base, in order.
    pub overlays: Vec<OverlayName>,
    /// Whether to build images before launch.
    pub build: bool,
    /// Wait between launch and the first probe.
    pub wait: Duration,
    /// Health attempts.
    pub max_retries: usize,
    /// Pause between health attempts.
    pub interval: Duration,
    /// Per-probe timeout.
    pub probe_timeout: Duration,
    /// Compose project name.
    pub project_name: Option<String>,
    /// Primary service, which gets the default HTTP check.
    pub app_service: String,
    /// Port of the primary service.
    pub service_port: u16,
    /// Explicit target list replacing the defaults.
    pub targets_file: Option<PathBuf>,
    /// Services to launch; empty means all.
    pub services: Vec<String>,
    /// Follow logs after the summary.
    pub follow: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            overlay_dir: PathBuf::from("."),
            overlays: Vec::new(),
            build: true,
            wait: DEFAULT_WAIT,
            max_retries: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            project_name: None,
            app_service: "app".to_string(),
            service_port: DEFAULT_SERVICE_PORT,
            targets_file: None,
            services: Vec::new(),
            follow: false,
        }
    }
}

impl OrchestratorConfig {
    /// Overlay order for the mode flags: environment first, then gpu.
    #[must_use]
    pub fn select_overlays(dev: bool, prod: bool, gpu: bool) -> Vec<OverlayName> {
        let mut overlays = Vec::new();
        if dev {
            overlays.push(OverlayName::Dev);
        }
        if prod {
            overlays.push(OverlayName::Prod);
        }
        if gpu {
            overlays.push(OverlayName::Gpu);
        }
        overlays
    }
}

/// What a run did and how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Terminal state.
    pub state: OrchestratorState,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// The rendered compose file used for launch.
    pub compose_file: PathBuf,
    /// Overlays that were applied.
    pub applied_overlays: Vec<OverlayName>,
    /// Services defined by the composed document.
    pub services: Vec<String>,
    /// Health verification outcome.
    pub health: HealthReport,
    /// Published endpoints.
    pub endpoints: Vec<Endpoint>,
    /// Non-fatal errors, in the order they happened.
    pub errors: Vec<ErrorInfo>,
    /// Whether the run was interrupted.
    pub cancelled: bool,
}

impl RunReport {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_INTERRUPTED
        } else if self.state == OrchestratorState::Ready {
            EXIT_READY
        } else {
            EXIT_DEGRADED
        }
    }

    /// Human-readable final status.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let status = if self.cancelled { "interrupted" } else { self.state.as_str() };
        let _ = writeln!(out, "Status: {status} ({} health rounds)", self.health.rounds);
        for (target, ok) in &self.health.results {
            let _ = writeln!(out, "  [{}] {target}", if *ok { "ok" } else { "!!" });
        }
        if !self.errors.is_empty() {
            let _ = writeln!(out, "Errors:");
            for error in &self.errors {
                let _ = writeln!(out, "  {}: {}", error.code, error.summary);
            }
        }
        if self.endpoints.is_empty() {
            let _ = writeln!(out, "No published endpoints");
        } else {
            let _ = writeln!(out, "Endpoints:");
            for endpoint in &self.endpoints {
                let _ = writeln!(out, "  {endpoint}");
            }
        }
        out
    }
}

/// Drives one run against a container runtime.
pub struct Orchestrator {
    config: OrchestratorConfig,
    runtime: Arc<dyn ContainerRuntime>,
    prober: Arc<dyn Prober>,
    cancel: CancellationToken,
    event_sink: Arc<dyn EventSink>,
    state: OrchestratorState,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator in the `Idle` state.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            config,
            runtime,
            prober,
            cancel: CancellationToken::new(),
            event_sink: Arc::new(NoOpEventSink),
            state: OrchestratorState::Idle,
        }
    }

    /// Sets the token that interrupts the run.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sets the sink for `orchestrator.state` and `health.round` events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    fn transition(&mut self, next: OrchestratorState) {
        debug_assert!(self.state.can_transition_to(next), "{} -> {next}", self.state);
        info!(from = %self.state, to = %next, "Orchestrator state changed");
        self.event_sink.try_emit(
            "orchestrator.state",
            Some(serde_json::json!({ "from": self.state, "to": next })),
        );
        self.state = next;
    }

    fn record(errors: &mut Vec<ErrorInfo>, error: &BuildStepFailedError) {
        warn!(step = %error.step, reason = %error.reason, "Continuing after failure");
        errors.push(error.error_info());
    }

    /// Runs the orchestrator once.
    ///
    /// # Errors
    ///
    /// Returns an error only for configuration problems found before any
    /// image is built or container started: a missing or unparseable base
    /// or overlay document, or an unreadable target file.
    pub async fn run(&mut self) -> Result<RunReport, StackupError> {
        let started_at = Utc::now();
        let timer = SpanTimer::start("orchestrator.run");
        let mut errors = Vec::new();

        self.transition(OrchestratorState::Preparing);
        let composer = OverlayComposer::new(&self.config.overlay_dir);
        let outcome = composer.compose(&self.config.overlays)?;
        let targets = match &self.config.targets_file {
            Some(path) => load_targets(path)?,
            None => Vec::new(),
        };
        let compose_file = composer.render(&outcome.merged)?;
        let targets = if self.config.targets_file.is_some() {
            targets
        } else {
            default_targets(
                &outcome.merged,
                &self.config.app_service,
                self.config.service_port,
                &compose_file,
            )
        };
        for missing in &outcome.missing {
            errors.push(missing.error_info());
        }
        for name in &self.config.services {
            if !outcome.merged.has_service(name) {
                warn!(service = %name, "Requested service is not defined in the composed document");
            }
        }

        if self.config.build {
            if let Err(e) = self.runtime.build(&compose_file, &self.config.services).await {
                Self::record(&mut errors, &e);
            }
        } else {
            info!("Skipping image build");
        }

        let health = if self.cancel.is_cancelled() {
            info!("Interrupted before launch; services were not started");
            self.transition(OrchestratorState::Degraded);
            HealthReport {
                rounds: 0,
                results: targets.iter().map(|t| (t.name.clone(), false)).collect(),
                cancelled: true,
            }
        } else {
            self.launch_and_verify(&compose_file, &targets, &mut errors).await
        };
        let cancelled = health.cancelled || self.cancel.is_cancelled();

        Ok(RunReport {
            state: self.state,
            started_at,
            duration_ms: timer.finish(),
            compose_file,
            applied_overlays: outcome.applied,
            services: outcome.merged.service_names(),
            health,
            endpoints: outcome.merged.endpoints(),
            errors,
            cancelled,
        })
    }

    async fn launch_and_verify(
        &mut self,
        compose_file: &Path,
        targets: &[HealthTarget],
        errors: &mut Vec<ErrorInfo>,
    ) -> HealthReport {
        self.transition(OrchestratorState::Launching);
        if let Err(e) = self.runtime.up(compose_file, &self.config.services).await {
            Self::record(errors, &e);
        }

        self.transition(OrchestratorState::Probing);
        if !self.config.wait.is_zero() {
            info!(wait_secs = self.config.wait.as_secs_f64(), "Waiting for services to start");
            tokio::select! {
                () = tokio::time::sleep(self.config.wait) => {}
                () = self.cancel.cancelled() => {}
            }
        }

        let health = HealthVerifier::new(self.prober.clone())
            .with_max_retries(self.config.max_retries)
            .with_interval(self.config.interval)
            .with_probe_timeout(self.config.probe_timeout)
            .with_cancellation(self.cancel.clone())
            .with_event_sink(self.event_sink.clone())
            .verify(targets)
            .await;

        if health.all_satisfied() && !health.cancelled && !self.cancel.is_cancelled() {
            self.transition(OrchestratorState::Ready);
        } else {
            if let Some(timeout) = health.timeout_error() {
                errors.push(timeout.error_info());
            }
            self.transition(OrchestratorState::Degraded);
        }
        health
    }

    /// Follows service logs until interrupted.
    ///
    /// # Errors
    ///
    /// Returns `BuildStepFailedError` if the log stream cannot be started.
    pub async fn follow_logs(&self, report: &RunReport) -> Result<(), BuildStepFailedError> {
        self.runtime.follow_logs(&report.compose_file, &self.cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::health::HealthCheck;
    use crate::testing::{RecordingRuntime, ScriptedProber};
    use pretty_assertions::assert_eq;

    const BASE: &str = "services:\n  app:\n    image: stackup-app:latest\n    ports: [\"8006:8006\"]\n  redis:\n    image: redis:7\n    ports: [\"6379:6379\"]\n";

    fn overlay_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), BASE).unwrap();
        std::fs::write(
            dir.path().join("docker-compose.dev.yml"),
            "services:\n  app:\n    environment:\n      DEBUG: \"1\"\n",
        )
        .unwrap();
        dir
    }

    fn config(dir: &tempfile::TempDir) -> OrchestratorConfig {
        OrchestratorConfig {
            overlay_dir: dir.path().to_path_buf(),
            wait: Duration::ZERO,
            max_retries: 3,
            interval: Duration::from_millis(1),
            ..OrchestratorConfig::default()
        }
    }

    fn app_check() -> HealthCheck {
        HealthCheck::Http {
            url: "http://localhost:8006/health".into(),
        }
    }

    fn redis_check() -> HealthCheck {
        HealthCheck::Tcp {
            host: "localhost".into(),
            port: 6379,
        }
    }

    #[test]
    fn test_select_overlays() {
        assert_eq!(
            OrchestratorConfig::select_overlays(true, false, true),
            vec![OverlayName::Dev, OverlayName::Gpu]
        );
        assert!(OrchestratorConfig::select_overlays(false, false, false).is_empty());
    }

    #[tokio::test]
    async fn test_ready_run() {
        let dir = overlay_dir();
        let runtime = Arc::new(RecordingRuntime::new());
        let prober = Arc::new(
            ScriptedProber::new()
                .succeed_on(&app_check(), 2)
                .succeed_on(&redis_check(), 1),
        );
        let sink = Arc::new(CollectingEventSink::new());
        let mut cfg = config(&dir);
        cfg.overlays = vec![OverlayName::Dev];

        let mut orchestrator = Orchestrator::new(cfg, runtime.clone(), prober).with_event_sink(sink.clone());
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.state, OrchestratorState::Ready);
        assert_eq!(report.exit_code(), EXIT_READY);
        assert_eq!(report.health.rounds, 2);
        assert_eq!(report.applied_overlays, vec![OverlayName::Dev]);
        assert_eq!(report.endpoints.len(), 2);
        assert!(report.errors.is_empty());
        assert_eq!(runtime.calls(), vec!["build", "up"]);
        assert_eq!(sink.events_of_type("orchestrator.state").len(), 4);
        assert!(report.summary().contains("Status: ready"));
    }

    #[tokio::test]
    async fn test_degraded_run_is_not_fatal() {
        let dir = overlay_dir();
        let prober = Arc::new(ScriptedProber::new().succeed_on(&redis_check(), 1));
        let mut orchestrator =
            Orchestrator::new(config(&dir), Arc::new(RecordingRuntime::new()), prober);

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.state, OrchestratorState::Degraded);
        assert_eq!(report.exit_code(), EXIT_DEGRADED);
        assert_eq!(report.health.rounds, 3);
        assert_eq!(report.errors[0].code, "HEALTH-001-TIMEOUT");
    }

    #[tokio::test]
    async fn test_build_and_launch_failures_are_recorded() {
        let dir = overlay_dir();
        let runtime = Arc::new(RecordingRuntime::new().failing_build().failing_up());
        let prober = Arc::new(
            ScriptedProber::new()
                .succeed_on(&app_check(), 1)
                .succeed_on(&redis_check(), 1),
        );
        let mut orchestrator = Orchestrator::new(config(&dir), runtime.clone(), prober);

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.state, OrchestratorState::Ready);
        let codes: Vec<&str> = report.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["BUILD-001-STEP_FAILED", "BUILD-001-STEP_FAILED"]);
    }

    #[tokio::test]
    async fn test_no_build_and_service_subset() {
        let dir = overlay_dir();
        let runtime = Arc::new(RecordingRuntime::new());
        let prober = Arc::new(ScriptedProber::new().succeed_on(&app_check(), 1));
        let mut cfg = config(&dir);
        cfg.build = false;
        cfg.services = vec!["app".to_string(), "ghost".to_string()];
        cfg.targets_file = Some(dir.path().join("targets.json"));
        std::fs::write(
            dir.path().join("targets.json"),
            r#"[{"name": "app", "kind": "http", "url": "http://localhost:8006/health"}]"#,
        )
        .unwrap();

        let report = Orchestrator::new(cfg, runtime.clone(), prober).run().await.unwrap();

        assert_eq!(runtime.calls(), vec!["up"]);
        assert_eq!(runtime.last_services(), vec!["app", "ghost"]);
        assert_eq!(report.state, OrchestratorState::Ready);
        assert_eq!(report.health.results.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_overlay_recorded() {
        let dir = overlay_dir();
        let prober = Arc::new(
            ScriptedProber::new()
                .succeed_on(&app_check(), 1)
                .succeed_on(&redis_check(), 1),
        );
        let mut cfg = config(&dir);
        cfg.overlays = vec![OverlayName::Gpu];

        let report = Orchestrator::new(cfg, Arc::new(RecordingRuntime::new()), prober)
            .run()
            .await
            .unwrap();
        assert_eq!(report.errors[0].code, "OVERLAY-001-NOT_FOUND");
        assert_eq!(report.state, OrchestratorState::Ready);
    }

    #[tokio::test]
    async fn test_missing_base_fails_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(RecordingRuntime::new());
        let mut orchestrator = Orchestrator::new(
            config(&dir),
            runtime.clone(),
            Arc::new(ScriptedProber::new()),
        );

        assert!(orchestrator.run().await.is_err());
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_run() {
        let dir = overlay_dir();
        let token = CancellationToken::new();
        token.cancel("interrupted by signal");
        let mut cfg = config(&dir);
        cfg.wait = Duration::from_secs(60);

        let report = Orchestrator::new(cfg, Arc::new(RecordingRuntime::new()), Arc::new(ScriptedProber::new()))
            .with_cancellation(token)
            .run()
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(report.state, OrchestratorState::Degraded);
        assert_eq!(report.health.rounds, 0);
    }

    #[tokio::test]
    async fn test_interrupt_before_launch_starts_nothing() {
        let dir = overlay_dir();
        let runtime = Arc::new(RecordingRuntime::new());
        let prober = Arc::new(ScriptedProber::new());
        let token = CancellationToken::new();
        token.cancel("interrupted by signal");
        let sink = Arc::new(CollectingEventSink::new());

        let report = Orchestrator::new(config(&dir), runtime.clone(), prober.clone())
            .with_cancellation(token)
            .with_event_sink(sink.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(runtime.calls(), vec!["build"]);
        assert_eq!(prober.total_calls(), 0);
        assert!(report.cancelled);
        assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(report.state, OrchestratorState::Degraded);
        assert_eq!(report.health.unsatisfied(), vec!["app", "redis"]);
        assert_eq!(sink.events_of_type("orchestrator.state").len(), 2);
    }
}
