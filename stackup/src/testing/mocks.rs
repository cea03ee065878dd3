//! Mock implementations of the crate's seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::core::StageOutput;
use crate::errors::BuildStepFailedError;
use crate::health::{HealthCheck, Prober};
use crate::orchestrator::ContainerRuntime;
use crate::stages::{Stage, StageContext};

/// A stage that records calls and returns a configurable output.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    output: Mutex<StageOutput>,
    calls: Mutex<Vec<String>>,
}

impl MockStage {
    /// Creates a mock stage that succeeds without an artifact.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(StageOutput::ok_empty()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the output to return.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Staging roots seen by each execution.
    #[must_use]
    pub fn staging_roots(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        self.calls
            .lock()
            .push(ctx.staging_root().to_string_lossy().into_owned());
        self.output.lock().clone()
    }
}

/// A prober whose checks pass from a scripted attempt onwards.
///
/// Checks are matched by their display form. Unscripted checks never pass.
#[derive(Debug, Default)]
pub struct ScriptedProber {
    succeed_from: HashMap<String, usize>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl ScriptedProber {
    /// Creates a prober where nothing passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `check` pass on its `attempt`-th probe (1-based) and later.
    #[must_use]
    pub fn succeed_on(mut self, check: &HealthCheck, attempt: usize) -> Self {
        self.succeed_from.insert(check.to_string(), attempt);
        self
    }

    /// Makes every probe take `delay` first.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How often `check` was probed.
    #[must_use]
    pub fn calls(&self, check: &HealthCheck) -> usize {
        self.calls.lock().get(&check.to_string()).copied().unwrap_or(0)
    }

    /// Total probes across all checks.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, check: &HealthCheck, limit: Duration) -> bool {
        let key = check.to_string();
        let attempt = {
            let mut calls = self.calls.lock();
            let count = calls.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(delay) = self.delay {
            if tokio::time::timeout(limit, tokio::time::sleep(delay)).await.is_err() {
                return false;
            }
        }
        self.succeed_from
            .get(&key)
            .is_some_and(|from| *from > 0 && attempt >= *from)
    }
}

/// A container runtime that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    calls: Mutex<Vec<String>>,
    services: Mutex<Vec<String>>,
    fail_build: bool,
    fail_up: bool,
}

impl RecordingRuntime {
    /// Creates a runtime where every operation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `build` fail.
    #[must_use]
    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    /// Makes `up` fail.
    #[must_use]
    pub fn failing_up(mut self) -> Self {
        self.fail_up = true;
        self
    }

    /// Operations performed, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Service subset passed to the most recent build or up.
    #[must_use]
    pub fn last_services(&self) -> Vec<String> {
        self.services.lock().clone()
    }

    fn record(&self, op: &str, services: &[String]) {
        self.calls.lock().push(op.to_string());
        *self.services.lock() = services.to_vec();
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn build(&self, _compose_file: &Path, services: &[String]) -> Result<(), BuildStepFailedError> {
        self.record("build", services);
        if self.fail_build {
            return Err(BuildStepFailedError::new("compose build", "scripted failure"));
        }
        Ok(())
    }

    async fn up(&self, _compose_file: &Path, services: &[String]) -> Result<(), BuildStepFailedError> {
        self.record("up", services);
        if self.fail_up {
            return Err(BuildStepFailedError::new("compose up", "scripted failure"));
        }
        Ok(())
    }

    async fn follow_logs(
        &self,
        _compose_file: &Path,
        _cancel: &CancellationToken,
    ) -> Result<(), BuildStepFailedError> {
        self.record("logs", &[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_prober() {
        let check = HealthCheck::Tcp { host: "localhost".into(), port: 1 };
        let prober = ScriptedProber::new().succeed_on(&check, 2);
        let limit = Duration::from_secs(1);

        assert!(!prober.probe(&check, limit).await);
        assert!(prober.probe(&check, limit).await);
        assert!(prober.probe(&check, limit).await);
        assert_eq!(prober.calls(&check), 3);
    }

    #[tokio::test]
    async fn test_scripted_prober_delay_respects_limit() {
        let check = HealthCheck::Tcp { host: "localhost".into(), port: 1 };
        let prober = ScriptedProber::new()
            .succeed_on(&check, 1)
            .with_delay(Duration::from_secs(10));
        assert!(!prober.probe(&check, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_mock_stage_records_calls() {
        let stage = MockStage::new("network-false");
        stage.set_output(StageOutput::fail("nope"));
        let ctx = StageContext::new("network-false", "/staging", "/src");

        let output = stage.execute(&ctx).await;
        assert!(!output.is_success());
        assert_eq!(stage.staging_roots(), vec!["/staging"]);
        assert_eq!(stage.call_count(), 1);
    }

    #[tokio::test]
    async fn test_recording_runtime() {
        let runtime = RecordingRuntime::new().failing_up();
        assert!(runtime.build(Path::new("c.json"), &["app".into()]).await.is_ok());
        assert!(runtime.up(Path::new("c.json"), &[]).await.is_err());
        assert_eq!(runtime.calls(), vec!["build", "up"]);
    }
}
