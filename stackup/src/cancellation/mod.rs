//! Cooperative cancellation for orchestrator runs.
//!
//! An interrupt (Ctrl-C) cancels the shared [`CancellationToken`]; the
//! health verifier checks it between attempts and the orchestrator stops
//! with the `Interrupted` outcome.

mod token;

pub use token::{listen_for_interrupt, CancellationToken, INTERRUPT_REASON};
