//! Bounded, monotonic readiness verification.

use super::{HealthTarget, Prober};
use crate::cancellation::CancellationToken;
use crate::errors::HealthCheckTimeoutError;
use crate::events::{EventSink, NoOpEventSink};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-probe timeout used when none is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts made when none is configured.
pub const DEFAULT_MAX_RETRIES: usize = 30;

/// Pause between attempts when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Attempts actually performed.
    pub rounds: usize,
    /// Whether each target was satisfied, by target name.
    pub results: BTreeMap<String, bool>,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
}

impl HealthReport {
    /// True when every target was satisfied.
    #[must_use]
    pub fn all_satisfied(&self) -> bool {
        self.results.values().all(|ok| *ok)
    }

    /// Names of unsatisfied targets, sorted.
    #[must_use]
    pub fn unsatisfied(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The timeout error, if any target never passed.
    #[must_use]
    pub fn timeout_error(&self) -> Option<HealthCheckTimeoutError> {
        let unsatisfied = self.unsatisfied();
        (!unsatisfied.is_empty()).then(|| HealthCheckTimeoutError::new(self.rounds, unsatisfied))
    }
}

/// Probes a target set until every target passes or attempts run out.
///
/// Satisfied targets are never probed again. Targets within one attempt
/// are probed concurrently, each under its own timeout. Cancellation is
/// observed between attempts, never mid-probe.
#[derive(Clone)]
pub struct HealthVerifier {
    prober: Arc<dyn Prober>,
    max_retries: usize,
    interval: Duration,
    probe_timeout: Duration,
    cancel: CancellationToken,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for HealthVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthVerifier")
            .field("max_retries", &self.max_retries)
            .field("interval", &self.interval)
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

impl HealthVerifier {
    /// Creates a verifier with default limits.
    #[must_use]
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self {
            prober,
            max_retries: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cancel: CancellationToken::new(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the number of attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the per-probe timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the token observed between attempts.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sets the sink `health.round` events go to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Runs the verification loop.
    ///
    /// State is tracked per target, not per name: a name shared by several
    /// targets is reported satisfied only once all of them pass.
    pub async fn verify(&self, targets: &[HealthTarget]) -> HealthReport {
        let mut satisfied = vec![false; targets.len()];
        let mut rounds = 0;
        let mut cancelled = false;

        while rounds < self.max_retries && !satisfied.iter().all(|ok| *ok) {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let pending = targets
                .iter()
                .enumerate()
                .filter(|(index, _)| !satisfied[*index]);
            let outcomes = join_all(pending.map(|(index, target)| async move {
                (index, self.prober.probe(&target.check, self.probe_timeout).await)
            }))
            .await;
            rounds += 1;

            for (index, ok) in outcomes {
                if ok {
                    debug!(target = %targets[index].name, check = %targets[index].check, round = rounds, "Health target satisfied");
                    satisfied[index] = true;
                }
            }

            let passed = satisfied.iter().filter(|ok| **ok).count();
            info!(round = rounds, satisfied = passed, total = targets.len(), "Health check round finished");
            self.event_sink.try_emit(
                "health.round",
                Some(serde_json::json!({
                    "round": rounds,
                    "satisfied": passed,
                    "total": targets.len(),
                })),
            );

            if passed == targets.len() || rounds == self.max_retries {
                break;
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
            }
        }

        let mut results: BTreeMap<String, bool> = BTreeMap::new();
        for (target, ok) in targets.iter().zip(&satisfied) {
            results
                .entry(target.name.clone())
                .and_modify(|all| *all &= *ok)
                .or_insert(*ok);
        }

        let report = HealthReport {
            rounds,
            results,
            cancelled,
        };
        if !report.all_satisfied() {
            warn!(rounds, unsatisfied = ?report.unsatisfied(), cancelled, "Health targets not satisfied");
        }
        report
    }
}
