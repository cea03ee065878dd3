//! Stage output.

use super::StageStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The output of a stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// Path of the artifact the stage left behind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced: Option<PathBuf>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: f64,
}

impl StageOutput {
    /// Creates a successful output for an artifact path.
    #[must_use]
    pub fn ok(produced: impl Into<PathBuf>) -> Self {
        Self {
            status: StageStatus::Ok,
            produced: Some(produced.into()),
            error: None,
            duration_ms: 0.0,
        }
    }

    /// Creates a successful output that produced nothing on disk.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            status: StageStatus::Ok,
            produced: None,
            error: None,
            duration_ms: 0.0,
        }
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            produced: None,
            error: Some(error.into()),
            duration_ms: 0.0,
        }
    }

    /// Records how long the stage ran.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_output() {
        let output = StageOutput::ok("stubs/network");
        assert!(output.is_success());
        assert_eq!(output.produced, Some(PathBuf::from("stubs/network")));
    }

    #[test]
    fn test_fail_output() {
        let output = StageOutput::fail("exit status 101").with_duration_ms(12.5);
        assert!(!output.is_success());
        assert_eq!(output.error.as_deref(), Some("exit status 101"));
        assert!((output.duration_ms - 12.5).abs() < f64::EPSILON);
    }
}
