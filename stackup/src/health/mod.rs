//! Health verification of a launched service set.

mod probe;
mod target;
mod verifier;

pub use probe::{Prober, SystemProber};
pub use target::{default_targets, load_targets, HealthCheck, HealthTarget};
pub use verifier::{
    HealthReport, HealthVerifier, DEFAULT_INTERVAL, DEFAULT_MAX_RETRIES, DEFAULT_PROBE_TIMEOUT,
};
