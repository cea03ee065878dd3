//! Test doubles for stages, probes and the container runtime.
//!
//! These are public so integration tests and downstream tooling can drive
//! the stage graph and the orchestrator without Docker or a network.

mod mocks;

pub use mocks::{MockStage, RecordingRuntime, ScriptedProber};
